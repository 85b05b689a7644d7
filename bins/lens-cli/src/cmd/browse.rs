use lens_engine::RefreshOutcome;

use crate::cmd::{Session, print_records, stream};
use crate::config::BrowseArgs;
use crate::error::CliError;

pub async fn run(config_path: &str, args: BrowseArgs) -> Result<(), CliError> {
    let mut session = Session::open(config_path)?;
    let controller = &mut session.controller;

    let initial = controller.configure(&session.profile.connection).await?;
    tracing::info!(status = %controller.status(), records = initial, "configured");

    controller.update_filter(session.profile.filter_patch());
    controller.update_filter(args.patch()?);
    if controller.is_filter_dirty() {
        match controller.refresh().await? {
            RefreshOutcome::Pulled(count) => tracing::info!(records = count, "filter applied"),
            RefreshOutcome::Streaming => {
                stream::follow(controller, None, |_| Ok(())).await?;
            }
        }
    }

    let page = controller.request_page(args.page).await?;
    tracing::info!(
        page = page.number,
        pages = page.total_pages,
        buffered = controller.buffered(),
        "page"
    );
    print_records(&page.records)
}
