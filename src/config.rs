#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_url: String,
    /// Directory monitored for instrument runfolders.
    pub monitored_dir: String,
    /// Directory holding standalone project directories.
    pub projects_dir: String,
    /// Root directory under which staging targets are created.
    pub staging_dir: String,
    /// Public base url used when building status links.
    pub base_url: String,
    /// Staging command prefix; source and target paths get appended.
    pub staging_command: Vec<String>,
    /// Classic delivery command prefix; staged path and delivery project get appended.
    pub mover_command: Vec<String>,
    pub dds_base_url: String,
    pub dds_timeout_secs: u64,
}
