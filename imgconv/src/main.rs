use std::fmt::Display;
use std::path::{Path, PathBuf};

use clap::{arg, command, crate_name, value_parser, Arg, ArgAction, ArgMatches, Command};
use cli::convert::ConvertParams;
use cli::required;
use converter::{CompressionLevel, ConvertOptions, OutputFormat, Resize};

mod cli;

#[tokio::main]
async fn main() {
    let cli = build_cli().get_matches();

    if cli.subcommand_matches(cli::VERSION_SUBCOMMAND).is_some() {
        cli::version::run();
    } else if cli.subcommand_matches(cli::BUGREPORT_SUBCOMMAND).is_some() {
        cli::bugreport::run();
    } else if cli.subcommand_matches(cli::SERVER_SUBCOMMAND).is_some() {
        cli::server::run().await;
    } else if let Some(m) = cli.subcommand_matches(cli::UPLOAD_SUBCOMMAND) {
        let file = Path::new(required(m, "file"));
        exit_on_error(cli::client::upload(required(m, "uri"), file).await);
    } else if let Some(m) = cli.subcommand_matches(cli::LIST_SUBCOMMAND) {
        let prefix = m.get_one::<String>("prefix").map(String::as_str);
        let limit = m.get_one::<usize>("limit").copied();
        exit_on_error(cli::client::list(required(m, "uri"), prefix, limit).await);
    } else if let Some(m) = cli.subcommand_matches(cli::DOWNLOAD_SUBCOMMAND) {
        let output = Path::new(required(m, "output"));
        exit_on_error(cli::client::download(required(m, "uri"), required(m, "key"), output).await);
    } else if let Some(m) = cli.subcommand_matches(cli::DELETE_SUBCOMMAND) {
        exit_on_error(cli::client::delete(required(m, "uri"), required(m, "key")).await);
    } else if let Some(m) = cli.subcommand_matches(cli::REMOTE_CONVERT_SUBCOMMAND) {
        let quality = m.get_one::<u32>("quality").copied();
        exit_on_error(
            cli::client::remote_convert(
                required(m, "uri"),
                required(m, "key"),
                required(m, "target"),
                quality,
            )
            .await,
        );
    } else if let Some(m) = cli.subcommand_matches(cli::BATCH_SUBCOMMAND) {
        let keys: Vec<String> = m
            .get_many::<String>("key")
            .map(|keys| keys.cloned().collect())
            .unwrap_or_default();
        let quality = m.get_one::<u32>("quality").copied();
        exit_on_error(
            cli::client::batch(required(m, "uri"), &keys, required(m, "target"), quality).await,
        );
    } else if let Some(m) = cli.subcommand_matches(cli::CONVERT_SUBCOMMAND) {
        let params = match convert_params(m) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(2);
            }
        };
        if let Some(warning) = quality_warning(&params.options) {
            eprintln!("warning: {warning}");
        }
        if !cli::convert::run(params).await {
            std::process::exit(1);
        }
    }
}

fn build_cli() -> Command {
    command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            Command::new(cli::UPLOAD_SUBCOMMAND)
                .about(cli::UPLOAD_DESCRIPTION)
                .arg(uri_arg())
                .arg(
                    arg!(-f --file <FILE>)
                        .required(true)
                        .help("Path to image to upload"),
                ),
        )
        .subcommand(
            Command::new(cli::LIST_SUBCOMMAND)
                .about(cli::LIST_DESCRIPTION)
                .arg(uri_arg())
                .arg(arg!(-p --prefix <PREFIX>).help("Key prefix, uploads/ if omitted"))
                .arg(
                    arg!(-l --limit <LIMIT>)
                        .value_parser(value_parser!(usize))
                        .help("Maximum number of files to list"),
                ),
        )
        .subcommand(
            Command::new(cli::DOWNLOAD_SUBCOMMAND)
                .about(cli::DOWNLOAD_DESCRIPTION)
                .arg(uri_arg())
                .arg(key_arg())
                .arg(
                    arg!(-o --output <PATH>)
                        .required(true)
                        .help("Path to save the file to"),
                ),
        )
        .subcommand(
            Command::new(cli::DELETE_SUBCOMMAND)
                .about(cli::DELETE_DESCRIPTION)
                .arg(uri_arg())
                .arg(key_arg()),
        )
        .subcommand(
            Command::new(cli::REMOTE_CONVERT_SUBCOMMAND)
                .about(cli::REMOTE_CONVERT_DESCRIPTION)
                .arg(uri_arg())
                .arg(key_arg())
                .arg(target_arg())
                .arg(quality_arg()),
        )
        .subcommand(
            Command::new(cli::BATCH_SUBCOMMAND)
                .about(cli::BATCH_DESCRIPTION)
                .arg(uri_arg())
                .arg(
                    key_arg()
                        .action(ArgAction::Append)
                        .help("File key. Repeat for every file"),
                )
                .arg(target_arg())
                .arg(quality_arg()),
        )
        .subcommand(
            Command::new(cli::CONVERT_SUBCOMMAND)
                .about(cli::CONVERT_DESCRIPTION)
                .arg(target_arg())
                .arg(quality_arg())
                .arg(
                    arg!(-r --resize <PRESET>)
                        .value_parser(cli::RESIZE_PRESETS)
                        .default_value("original")
                        .help("Size preset"),
                )
                .arg(
                    arg!(--width <WIDTH>)
                        .value_parser(value_parser!(u32))
                        .help("Output width in pixels. Overrides the preset"),
                )
                .arg(
                    arg!(--height <HEIGHT>)
                        .value_parser(value_parser!(u32))
                        .help("Output height in pixels. Overrides the preset"),
                )
                .arg(arg!(--"no-aspect" "Do not keep the aspect ratio when only one side is given"))
                .arg(
                    arg!(-c --compression <LEVEL>)
                        .value_parser(cli::COMPRESSION_LEVELS)
                        .help("Compression level applied on top of the quality"),
                )
                .arg(arg!(--"auto-rotate" "Rotate according to EXIF orientation"))
                .arg(
                    arg!(-o --output <DIR>)
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to write converted files into"),
                )
                .arg(
                    Arg::new("files")
                        .value_name("FILE")
                        .required(true)
                        .num_args(1..)
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(PathBuf))
                        .help("Images to convert"),
                ),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
}

fn uri_arg() -> Arg {
    arg!(-u --uri <URI>)
        .required(true)
        .help("Image converter service URI, e.g. http://localhost:5000")
}

fn key_arg() -> Arg {
    arg!(-k --key <KEY>).required(true).help("File key")
}

fn target_arg() -> Arg {
    arg!(-t --target <FORMAT>)
        .required(true)
        .value_parser(cli::FORMATS)
        .help("Target format")
}

fn quality_arg() -> Arg {
    arg!(-q --quality <QUALITY>)
        .value_parser(value_parser!(u32).range(0..=100))
        .help("Quality from 0 to 100")
}

fn convert_params(m: &ArgMatches) -> Result<ConvertParams, converter::ConvertError> {
    let format: OutputFormat = required(m, "target").parse()?;
    let width = m.get_one::<u32>("width").copied();
    let height = m.get_one::<u32>("height").copied();
    let resize = if width.is_some() || height.is_some() {
        Resize::custom(width, height)
    } else {
        required(m, "resize").parse()?
    };
    let compression_level = m
        .get_one::<String>("compression")
        .map(|c| c.parse::<CompressionLevel>())
        .transpose()?;

    let options = ConvertOptions {
        quality: m.get_one::<u32>("quality").copied(),
        resize,
        maintain_aspect_ratio: !m.get_flag("no-aspect"),
        compression_level,
        auto_rotate: m.get_flag("auto-rotate"),
        ..ConvertOptions::new(format)
    };

    Ok(ConvertParams {
        files: m
            .get_many::<PathBuf>("files")
            .map(|files| files.cloned().collect())
            .unwrap_or_default(),
        output: m
            .get_one::<PathBuf>("output")
            .cloned()
            .unwrap_or_default(),
        options,
    })
}

fn quality_warning(options: &ConvertOptions) -> Option<String> {
    let ignored = options.quality.is_some() || options.compression_level.is_some();
    (ignored && !options.format.is_lossy())
        .then(|| format!("{} is lossless, quality settings are ignored", options.format))
}

fn exit_on_error<E: Display>(result: Result<(), E>) {
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn cli_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn convert_arguments_become_options() {
        // Arrange
        let args = [
            "imgconv", "convert", "-t", "png", "-q", "70", "--width", "64", "--no-aspect", "-c",
            "high", "--auto-rotate", "-o", "out", "a.jpg", "b.jpg",
        ];

        // Act
        let matches = build_cli().try_get_matches_from(args).unwrap();
        let m = matches.subcommand_matches(cli::CONVERT_SUBCOMMAND).unwrap();
        let params = convert_params(m).unwrap();

        // Assert
        assert_eq!(params.files, vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")]);
        assert_eq!(params.output, PathBuf::from("out"));
        assert_eq!(params.options.format, OutputFormat::Png);
        assert_eq!(params.options.quality, Some(70));
        assert_eq!(params.options.resize, Resize::custom(Some(64), None));
        assert!(!params.options.maintain_aspect_ratio);
        assert_eq!(params.options.compression_level, Some(CompressionLevel::High));
        assert!(params.options.auto_rotate);
    }

    #[rstest]
    #[case(&["imgconv", "convert", "-t", "png", "-q", "70", "-o", "out", "a.jpg"], true)]
    #[case(&["imgconv", "convert", "-t", "webp", "-c", "high", "-o", "out", "a.jpg"], true)]
    #[case(&["imgconv", "convert", "-t", "jpg", "-q", "70", "-o", "out", "a.png"], false)]
    #[case(&["imgconv", "convert", "-t", "png", "-o", "out", "a.jpg"], false)]
    #[trace]
    fn quality_on_lossless_format_warns(#[case] args: &[&str], #[case] warns: bool) {
        // Arrange
        let matches = build_cli().try_get_matches_from(args).unwrap();
        let m = matches.subcommand_matches(cli::CONVERT_SUBCOMMAND).unwrap();
        let params = convert_params(m).unwrap();

        // Act
        let warning = quality_warning(&params.options);

        // Assert
        assert_eq!(warning.is_some(), warns);
    }

    #[test]
    fn batch_collects_repeated_keys() {
        // Arrange
        let args = [
            "imgconv", "batch", "-u", "http://localhost:5000", "-t", "webp", "-k", "uploads/1-a.png",
            "-k", "uploads/2-b.png",
        ];

        // Act
        let matches = build_cli().try_get_matches_from(args).unwrap();

        // Assert
        let m = matches.subcommand_matches(cli::BATCH_SUBCOMMAND).unwrap();
        let keys: Vec<&String> = m.get_many::<String>("key").unwrap().collect();
        assert_eq!(keys, ["uploads/1-a.png", "uploads/2-b.png"]);
        assert_eq!(required(m, "target"), "webp");
    }

    #[rstest]
    #[case("original", Resize::Original)]
    #[case("small", Resize::Small)]
    #[case("large", Resize::Large)]
    #[trace]
    fn convert_resize_preset(#[case] preset: &str, #[case] expected: Resize) {
        // Arrange
        let args = ["imgconv", "convert", "-t", "jpg", "-r", preset, "-o", "out", "a.png"];

        // Act
        let matches = build_cli().try_get_matches_from(args).unwrap();
        let m = matches.subcommand_matches(cli::CONVERT_SUBCOMMAND).unwrap();
        let params = convert_params(m).unwrap();

        // Assert
        assert_eq!(params.options.resize, expected);
        assert!(params.options.maintain_aspect_ratio);
    }

    #[rstest]
    #[case(&["imgconv", "convert", "-t", "tiff", "-o", "out", "a.png"])]
    #[case(&["imgconv", "convert", "-t", "jpg", "-q", "101", "-o", "out", "a.png"])]
    #[case(&["imgconv", "convert", "-t", "jpg", "-o", "out"])]
    #[case(&["imgconv", "upload", "-u", "http://localhost:5000"])]
    #[trace]
    fn invalid_arguments_rejected(#[case] args: &[&str]) {
        assert!(build_cli().try_get_matches_from(args).is_err());
    }
}
