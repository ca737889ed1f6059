use clap::ArgMatches;

pub mod bugreport;
pub mod client;
pub mod convert;
pub mod server;
pub mod version;

pub const SERVER_SUBCOMMAND: &str = "server";
pub const SERVER_DESCRIPTION: &str = "Run the image converter service";

pub const VERSION_SUBCOMMAND: &str = "version";
pub const VERSION_DESCRIPTION: &str = "Display the version and build information";

pub const BUGREPORT_SUBCOMMAND: &str = "bugreport";
pub const BUGREPORT_DESCRIPTION: &str = "Collect information about the system and the environment that you can send along with a bug report";

pub const UPLOAD_SUBCOMMAND: &str = "upload";
pub const UPLOAD_DESCRIPTION: &str = "Upload an image to the service";

pub const LIST_SUBCOMMAND: &str = "list";
pub const LIST_DESCRIPTION: &str = "List files kept by the service";

pub const DOWNLOAD_SUBCOMMAND: &str = "download";
pub const DOWNLOAD_DESCRIPTION: &str = "Download a file from the service";

pub const DELETE_SUBCOMMAND: &str = "delete";
pub const DELETE_DESCRIPTION: &str = "Delete a file from the service";

pub const REMOTE_CONVERT_SUBCOMMAND: &str = "remote-convert";
pub const REMOTE_CONVERT_DESCRIPTION: &str = "Convert an uploaded file on the service";

pub const BATCH_SUBCOMMAND: &str = "batch";
pub const BATCH_DESCRIPTION: &str = "Convert several uploaded files on the service";

pub const CONVERT_SUBCOMMAND: &str = "convert";
pub const CONVERT_DESCRIPTION: &str = "Convert local image files";

pub const FORMATS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "bmp", "gif"];
pub const RESIZE_PRESETS: [&str; 4] = ["original", "small", "medium", "large"];
pub const COMPRESSION_LEVELS: [&str; 4] = ["none", "low", "medium", "high"];

/// Value of an argument clap already validated as required.
pub fn required<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches.get_one::<String>(id).map_or("", String::as_str)
}
