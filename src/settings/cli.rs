use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "tollgate", about = "Token-checking API gateway")]
pub struct Cli {
    /// Path to a TOML settings file; defaults to settings/dev.toml or settings/release.toml.
    #[arg(long)]
    pub settings: Option<String>,

    /// Load and validate the settings, print them (secrets redacted), then exit.
    #[arg(long)]
    pub check_settings: bool,
}
