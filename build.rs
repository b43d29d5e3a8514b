// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn layout_args() -> [Arg; 5] {
    [
        Arg::new("root")
            .long("root")
            .env("PARCEL_ROOT")
            .default_value("/var/lib/parcel")
            .help("Data root holding packages/ and lists/"),
        Arg::new("install_base")
            .long("install-base")
            .env("PARCEL_INSTALL_BASE")
            .help("Install base directory (overrides <root>/packages)"),
        Arg::new("list_base")
            .long("list-base")
            .env("PARCEL_LIST_BASE")
            .help("List base directory (overrides <root>/lists)"),
        Arg::new("owner")
            .long("owner")
            .env("PARCEL_OWNER")
            .value_name("UID[:GID]")
            .help("Owner applied to installed files"),
        Arg::new("git_base")
            .long("git-base")
            .env("PARCEL_GIT_BASE")
            .default_value("https://github.com")
            .help("Host used to resolve git:// sources"),
    ]
}

fn build_cli() -> Command {
    Command::new("parcel")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Parcel Contributors")
        .about("Zip package installer with checksum validation and rollback")
        .subcommand_required(false)
        .subcommand(
            Command::new("install")
                .about("Install a package from a path, file://, git://owner/repo[@ref] or '-' for stdin")
                .arg(Arg::new("source").required(true).help("Package source"))
                .arg(
                    Arg::new("no_update")
                        .long("no-update")
                        .action(ArgAction::SetTrue)
                        .help("Fail if the package is already installed"),
                )
                .arg(
                    Arg::new("ignore_deps")
                        .long("ignore-deps")
                        .action(ArgAction::SetTrue)
                        .help("Skip dependency checks"),
                )
                .args(layout_args()),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove an installed package")
                .arg(Arg::new("package_name").required(true).help("Package name to remove"))
                .args(layout_args()),
        )
        .subcommand(
            Command::new("list")
                .about("List installed packages")
                .args(layout_args()),
        )
        .subcommand(
            Command::new("pack")
                .about("Build a package from a directory")
                .arg(Arg::new("dir").required(true).help("Directory whose contents become the payload"))
                .arg(Arg::new("name").short('n').long("name").required(true).help("Package name"))
                .arg(Arg::new("version").short('v').long("version").help("Package version"))
                .arg(Arg::new("description").short('d').long("description").help("Package description"))
                .arg(Arg::new("output").short('o').long("output").required(true).help("Output file")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("parcel.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
