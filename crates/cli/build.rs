use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let manifest_arg = || clap::arg!(<MANIFEST> "JSON manifest of articles");
    let mut cmd = clap::Command::new("quire")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Quire Contributors")
        .about("Turn saved articles into self-contained HTML documents")
        .arg(clap::arg!(-v --verbose ... "More logging (-v debug, -vv trace)").global(true))
        .arg(clap::arg!(-q --quiet "Only log warnings and errors").global(true))
        .subcommand(
            clap::Command::new("process")
                .about("Process every article of a manifest through the configured stages")
                .arg(manifest_arg())
                .arg(
                    clap::arg!(-c --config <FILE> "Configuration file")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    clap::arg!(-o --output <DIR> "Output folder when no configuration file exists")
                        .default_value(".")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(clap::arg!(-t --threads <NUM> "Override the configured number of worker threads")),
        )
        .subcommand(
            clap::Command::new("list")
                .about("List the articles of a manifest without processing them")
                .arg(manifest_arg()),
        )
        .subcommand(
            clap::Command::new("template")
                .about("Write the built-in template to a file for customizing")
                .arg(clap::arg!(<FILE> "Template file to create").value_parser(clap::value_parser!(std::path::PathBuf))),
        )
        .subcommand(
            clap::Command::new("completions")
                .about("Generate a shell completion script")
                .arg(clap::arg!(<SHELL> "Shell").value_parser(["bash", "zsh", "fish", "powershell", "elvish"])),
        );

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "quire", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "quire", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "quire", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "quire", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
