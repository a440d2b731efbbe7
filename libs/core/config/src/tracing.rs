use crate::Environment;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Log directives used when `RUST_LOG` is not set.
fn default_directives(environment: &Environment) -> &'static str {
    match environment {
        Environment::Production => "info,sea_orm=warn,reqwest=warn",
        Environment::Development => "debug,sea_orm=info,reqwest=info",
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` always wins; otherwise the environment picks the defaults
/// above. Production emits JSON without module targets (for log
/// shipping); development pretty-prints. Calling this twice is harmless -
/// the second installation is skipped, which tests rely on.
pub fn init_tracing(environment: &Environment) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_rust_log) => from_rust_log,
        Err(_) => EnvFilter::new(default_directives(environment)),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if environment.is_production() {
        builder.json().with_target(false).try_init()
    } else {
        builder.pretty().try_init()
    };

    if installed.is_err() {
        // Another subscriber got there first, common when tests share a
        // process.
        debug!("tracing subscriber already installed");
    }
}

/// Install the color-eyre panic and error report hooks.
///
/// Safe to call more than once; later calls are no-ops.
pub fn install_color_eyre() {
    if color_eyre::install().is_err() {
        debug!("color-eyre hooks already installed");
    }
}
