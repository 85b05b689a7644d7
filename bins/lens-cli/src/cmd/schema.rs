use crate::cmd::Session;
use crate::config::SchemaArgs;
use crate::error::CliError;

pub async fn run(config_path: &str, args: SchemaArgs) -> Result<(), CliError> {
    let session = Session::open(config_path)?;
    let files = if args.files.is_empty() {
        session.profile.connection.schema_files.clone()
    } else {
        args.files
    };
    let meta = session.controller.describe_schema(&files).await?;
    println!("descriptor_key = {:?}", meta.cache_key);
    for name in &meta.message_types {
        println!("{name}");
    }
    Ok(())
}
