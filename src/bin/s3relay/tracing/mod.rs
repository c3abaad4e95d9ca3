use std::env;

use tracing_subscriber::fmt::format::FmtSpan;

use s3relay::config::TracingConfig;

const EVENT_FILTER_ENV_VAR: &str = "RUST_LOG";

pub fn init_tracing(config: &TracingConfig) {
    let fmt_span = if config.span_events_tracing {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (event_filter, show_target) =
        event_filter(config, env::var(EVENT_FILTER_ENV_VAR).ok());

    let subscriber_builder = tracing_subscriber::fmt()
        .compact()
        .with_ansi(!config.disable_color_tracing)
        .with_span_events(fmt_span)
        .with_env_filter(event_filter)
        .with_target(show_target);

    if config.json_tracing {
        subscriber_builder.json().init();
    } else {
        subscriber_builder.init();
    }
}

// AWS SDK tracing wins over RUST_LOG, which wins over the crate-only filter.
fn event_filter(config: &TracingConfig, env_filter: Option<String>) -> (String, bool) {
    let tracing_level = config.tracing_level;

    if config.aws_sdk_tracing {
        return (
            format!(
                "s3relay={tracing_level},aws_smithy_runtime={tracing_level},aws_config={tracing_level},aws_sigv4={tracing_level}"
            ),
            true,
        );
    }

    match env_filter {
        Some(env_filter) => (env_filter, true),
        None => (format!("s3relay={tracing_level}"), false),
    }
}

#[cfg(test)]
mod tests {
    use rusty_fork::rusty_fork_test;

    use super::*;

    fn tracing_config(aws_sdk_tracing: bool) -> TracingConfig {
        TracingConfig {
            tracing_level: log::Level::Info,
            json_tracing: false,
            aws_sdk_tracing,
            span_events_tracing: false,
            disable_color_tracing: false,
        }
    }

    #[test]
    fn crate_only_filter() {
        assert_eq!(
            event_filter(&tracing_config(false), None),
            ("s3relay=INFO".to_string(), false)
        );
    }

    #[test]
    fn env_filter_wins_over_level() {
        assert_eq!(
            event_filter(&tracing_config(false), Some("trace".to_string())),
            ("trace".to_string(), true)
        );
    }

    #[test]
    fn aws_sdk_filter_wins_over_env() {
        let (filter, show_target) =
            event_filter(&tracing_config(true), Some("trace".to_string()));

        assert!(filter.starts_with("s3relay=INFO,aws_smithy_runtime=INFO"));
        assert!(show_target);
    }

    rusty_fork_test! {
        #[test]
        fn init_json_tracing() {
            init_tracing(&TracingConfig {
                json_tracing: true,
                ..tracing_config(false)
            });
        }

        #[test]
        fn init_span_events_tracing() {
            init_tracing(&TracingConfig {
                span_events_tracing: true,
                disable_color_tracing: true,
                ..tracing_config(true)
            });
        }

        #[test]
        fn init_with_env() {
            // Separate process, so the environment change stays local.
            unsafe { env::set_var(EVENT_FILTER_ENV_VAR, "s3relay=trace") };

            init_tracing(&tracing_config(false));
        }
    }
}
