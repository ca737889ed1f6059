use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&[
            "SHELL",
            "TERM",
            "RUST_LOG",
            "IMGCONV_PORT",
            "IMGCONV_DATA_DIR",
            "IMGCONV_DATA_FILE",
            "IMGCONV_ENVIRONMENT",
            "IMGCONV_MAX_UPLOAD_BYTES",
            "IMGCONV_MAX_BATCH",
            "IMGCONV_TTL_SECS",
            "IMGCONV_CLEANUP_INTERVAL_SECS",
        ]))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
