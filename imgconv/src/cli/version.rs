use serde::Serialize;
use std::env;

#[derive(Debug, Clone, Serialize)]
struct VersionInfo {
    pub name: String,
    pub version: String,
    pub os: String,
    pub architecture: String,
    pub formats: String,
}

pub fn run() {
    let formats: Vec<&str> = converter::OutputFormat::ALL
        .iter()
        .map(|f| f.extension())
        .collect();
    let info = VersionInfo {
        name: clap::crate_name!().to_string(),
        version: clap::crate_version!().to_string(),
        os: env::consts::OS.to_string(),
        architecture: env::consts::ARCH.to_string(),
        formats: formats.join(", "),
    };

    println!("Name           : {}", info.name);
    println!("Version        : {}", info.version);
    println!("OS             : {}", info.os);
    println!("Architecture   : {}", info.architecture);
    println!("Output formats : {}", info.formats);
}
