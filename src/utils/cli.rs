use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Args {
    /// Service listening host
    #[arg(long, env = "DELIVERY_HOST", default_value = "127.0.0.1")]
    pub(crate) host: String,

    /// Service listening port
    #[arg(short, long, env = "DELIVERY_PORT", default_value_t = 8080)]
    pub(crate) port: u16,

    /// Database connection url
    #[arg(
        long,
        env = "DELIVERY_DATABASE_URL",
        default_value = "sqlite:///var/lib/delivery-ws/delivery.db"
    )]
    pub(crate) database_url: String,

    /// Directory monitored for instrument runfolders
    #[arg(long, env = "DELIVERY_MONITORED_DIR", default_value = "/data/runfolders")]
    pub(crate) monitored_directory: String,

    /// Directory holding standalone project directories
    #[arg(long, env = "DELIVERY_PROJECTS_DIR", default_value = "/data/projects")]
    pub(crate) projects_directory: String,

    /// Root directory for staging targets
    #[arg(long, env = "DELIVERY_STAGING_DIR", default_value = "/data/staging")]
    pub(crate) staging_directory: String,

    /// Public base url used in status links
    #[arg(
        long,
        env = "DELIVERY_PUBLIC_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    pub(crate) base_url: String,

    /// Staging command; source and target paths get appended
    #[arg(
        long,
        env = "DELIVERY_STAGING_COMMAND",
        default_value = "rsync -r --stats"
    )]
    pub(crate) staging_command: String,

    /// Classic delivery command; staged path and project get appended
    #[arg(long, env = "DELIVERY_MOVER_COMMAND", default_value = "to_outbox")]
    pub(crate) mover_command: String,

    /// Base url of the external data-delivery system
    #[arg(
        long,
        env = "DELIVERY_DDS_URL",
        default_value = "http://127.0.0.1:9000"
    )]
    pub(crate) dds_base_url: String,

    /// Per-call timeout for delivery system requests, in seconds
    #[arg(long, env = "DELIVERY_DDS_TIMEOUT", default_value_t = 30)]
    pub(crate) dds_timeout_secs: u64,
}
