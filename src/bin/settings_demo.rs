use tollgate::settings::*;

fn main() -> anyhow::Result<()> {
    // $ cargo run --bin settings_demo -- --settings=settings/release.toml
    let cli = Cli::parse();
    let project_settings = parse_settings(cli.settings.as_deref())?;
    println!("Loaded settings: {:#?}", project_settings);

    // Environment wins over the file; secrets stay redacted in Debug output.
    // $ TOLLGATE__JWT__ACCESS_TTL_SECS=60 cargo run --bin settings_demo
    println!("Access token lifetime: {}s", project_settings.jwt.access_ttl_secs);

    let is_err = parse_settings(Some("does/not/exist.toml")).is_err();
    println!("Error on missing file: {:?}", is_err);
    Ok(())
}
