// src/main.rs

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use parcel::filesystem::{InstallLayout, Ownership};
use parcel::{privilege, InstallOptions, Installer, InstallerConfig, PackageBuilder, Source};
use semver::Version;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "parcel")]
#[command(author, version, about = "Zip package installer with checksum validation and rollback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Where packages are installed and recorded
#[derive(Args, Debug, Clone)]
struct LayoutArgs {
    /// Data root holding packages/ and lists/
    #[arg(long, env = "PARCEL_ROOT", default_value = parcel::config::DEFAULT_ROOT)]
    root: PathBuf,

    /// Install base directory (overrides <root>/packages)
    #[arg(long, env = "PARCEL_INSTALL_BASE")]
    install_base: Option<PathBuf>,

    /// List base directory (overrides <root>/lists)
    #[arg(long, env = "PARCEL_LIST_BASE")]
    list_base: Option<PathBuf>,

    /// Owner applied to installed files, as UID[:GID]
    #[arg(long, env = "PARCEL_OWNER")]
    owner: Option<Ownership>,

    /// Host used to resolve git:// sources
    #[arg(long, env = "PARCEL_GIT_BASE", default_value = parcel::config::DEFAULT_GIT_BASE_URL)]
    git_base: String,
}

impl LayoutArgs {
    fn into_config(self) -> InstallerConfig {
        let mut config = InstallerConfig::with_root(&self.root);

        let defaults = config.layout.clone();
        config.layout = InstallLayout::new(
            self.install_base.unwrap_or_else(|| defaults.install_base().to_path_buf()),
            self.list_base.unwrap_or_else(|| defaults.list_base().to_path_buf()),
        );
        config.ownership = self.owner;
        config.git_base_url = self.git_base;
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package from a path, file://, git://owner/repo[@ref] or '-' for stdin
    Install {
        /// Package source
        source: String,
        /// Fail if the package is already installed
        #[arg(long)]
        no_update: bool,
        /// Skip dependency checks
        #[arg(long)]
        ignore_deps: bool,
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Remove an installed package
    Remove {
        /// Package name to remove
        package_name: String,
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// List installed packages
    List {
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Build a package from a directory
    Pack {
        /// Directory whose contents become the payload
        dir: PathBuf,
        /// Package name
        #[arg(short, long)]
        name: String,
        /// Package version
        #[arg(short, long)]
        version: Option<Version>,
        /// Package description
        #[arg(short, long)]
        description: Option<String>,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Install {
            source,
            no_update,
            ignore_deps,
            layout,
        }) => {
            privilege::require_confirmation(source == "-")?;

            let installer = Installer::new(layout.into_config());
            let mut options = InstallOptions {
                update_when_exists: !no_update,
                ignore_dependencies: ignore_deps,
                source: None,
            };

            let report = if source == "-" {
                let mut buffer = Vec::new();
                io::Read::read_to_end(&mut io::stdin().lock(), &mut buffer)
                    .context("Failed to read package from stdin")?;
                options.source = Some(Source::Local(buffer));
                installer.install(&options)?
            } else {
                installer.install_from_url(&source, &options)?
            };

            println!("Installed package: {}", report.name);
            println!("  Location: {}", report.install_dir.display());
            println!("  Files: {}", report.files.len());
            Ok(())
        }
        Some(Commands::Remove {
            package_name,
            layout,
        }) => {
            privilege::require_confirmation(false)?;

            let installer = Installer::new(layout.into_config());
            let report = installer.remove(&package_name)?;

            println!("Removed package: {}", report.name);
            println!("  Files removed: {}", report.files);
            Ok(())
        }
        Some(Commands::List { layout }) => {
            let installer = Installer::new(layout.into_config());
            let packages = installer.installed_packages()?;

            if packages.is_empty() {
                println!("No packages installed.");
            } else {
                println!("Installed packages:");
                for name in &packages {
                    println!("  {}", name);
                }
                println!("\nTotal: {} package(s)", packages.len());
            }
            Ok(())
        }
        Some(Commands::Pack {
            dir,
            name,
            version,
            description,
            output,
        }) => {
            info!("Packing {} as {}", dir.display(), name);

            let mut builder = PackageBuilder::new(&name).from_dir(&dir)?;
            if let Some(version) = version {
                builder = builder.version(version);
            }
            if let Some(description) = description {
                builder = builder.description(description);
            }

            let bytes = builder.build()?;
            fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!("Created package {} ({} bytes)", output.display(), bytes.len());
            Ok(())
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "parcel", &mut io::stdout());
            Ok(())
        }
        None => {
            println!("Parcel Package Installer v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'parcel --help' for usage information");
            Ok(())
        }
    }
}
