use crate::cmd::Session;
use crate::error::CliError;

pub async fn run(config_path: &str) -> Result<(), CliError> {
    let session = Session::open(config_path)?;
    let found = session.controller.discover_topics(&session.profile.connection).await;
    if let Some(error) = &found.error {
        eprintln!("topic discovery failed: {error}");
    }
    for topic in &found.items {
        println!("{topic}");
    }
    Ok(())
}
