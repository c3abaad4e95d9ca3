#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use tempfile::NamedTempFile;

    use crate::config::args::*;
    use crate::config::{RunMode, SendInput};
    use crate::pipeline::listing_file::ListingFormat;

    const LOCATIONS: &str = r#"
source: { name: landing, base_path: landing-bucket }
destinations: [ { name: archive, base_path: archive-bucket } ]
"#;

    fn locations_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(LOCATIONS.as_bytes()).unwrap();
        file
    }

    #[test]
    fn list_to_stdout() {
        init_dummy_tracing_subscriber();

        let file = locations_file();
        let config_file = file.path().to_string_lossy().to_string();

        let config =
            build_config_from_args(vec!["s3relay", "list", "--config-file", &config_file])
                .unwrap();

        assert_eq!(
            config.mode,
            RunMode::List {
                output: None,
                format: ListingFormat::Ndjson
            }
        );
    }

    #[test]
    fn list_to_file_with_backfill() {
        init_dummy_tracing_subscriber();

        let file = locations_file();
        let config_file = file.path().to_string_lossy().to_string();

        let config = build_config_from_args(vec![
            "s3relay",
            "--config-file",
            &config_file,
            "list",
            "--backfill",
            "-o",
            "./listing.json",
            "--format",
            "json",
        ])
        .unwrap();

        assert!(config.listing_config.backfill);
        assert_eq!(
            config.mode,
            RunMode::List {
                output: Some(PathBuf::from("./listing.json")),
                format: ListingFormat::Json
            }
        );
    }

    #[test]
    fn backfill_conflicts_with_time_window() {
        init_dummy_tracing_subscriber();

        let file = locations_file();
        let config_file = file.path().to_string_lossy().to_string();

        let args = vec![
            "s3relay",
            "--config-file",
            &config_file,
            "sync",
            "--backfill",
            "--time-window",
            "1h",
        ];
        assert!(parse_from_args(args).is_err());
    }

    #[test]
    fn send_listing_file() {
        init_dummy_tracing_subscriber();

        let file = locations_file();
        let config_file = file.path().to_string_lossy().to_string();
        let listing = NamedTempFile::new().unwrap();
        let listing_file = listing.path().to_string_lossy().to_string();

        let config = build_config_from_args(vec![
            "s3relay",
            "--config-file",
            &config_file,
            "send",
            "--listing-file",
            &listing_file,
        ])
        .unwrap();

        assert_eq!(
            config.mode,
            RunMode::Send(SendInput::ListingFile(listing.path().to_path_buf()))
        );
        assert!(!config.listing_config.backfill);
    }

    #[test]
    fn send_single_key() {
        init_dummy_tracing_subscriber();

        let file = locations_file();
        let config_file = file.path().to_string_lossy().to_string();

        let config = build_config_from_args(vec![
            "s3relay",
            "--config-file",
            &config_file,
            "send",
            "--key",
            "2024/03/a.csv.gz",
        ])
        .unwrap();

        assert_eq!(
            config.mode,
            RunMode::Send(SendInput::Key("2024/03/a.csv.gz".to_string()))
        );
    }

    #[test]
    fn send_requires_exactly_one_input() {
        init_dummy_tracing_subscriber();

        let file = locations_file();
        let config_file = file.path().to_string_lossy().to_string();
        let listing = NamedTempFile::new().unwrap();
        let listing_file = listing.path().to_string_lossy().to_string();

        assert!(parse_from_args(vec!["s3relay", "--config-file", &config_file, "send"]).is_err());
        assert!(
            parse_from_args(vec![
                "s3relay",
                "--config-file",
                &config_file,
                "send",
                "--listing-file",
                &listing_file,
                "--key",
                "a.csv",
            ])
            .is_err()
        );
        assert!(
            parse_from_args(vec![
                "s3relay",
                "--config-file",
                &config_file,
                "send",
                "--key",
                "",
            ])
            .is_err()
        );
    }

    #[test]
    fn subcommand_required() {
        init_dummy_tracing_subscriber();

        let file = locations_file();
        let config_file = file.path().to_string_lossy().to_string();

        assert!(parse_from_args(vec!["s3relay", "--config-file", &config_file]).is_err());
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
