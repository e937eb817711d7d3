//! Ambient CLI nicety (spec §6 expansion), grounded in the teacher's
//! `commands::status::run`: a local, offline, read-only summary of one
//! crawl's persisted rows. Not the out-of-scope HTTP inspection service —
//! that renders JSON and an XML sitemap over a network listener, this just
//! prints counts.

use anyhow::Result;

use sitecrawl_storage::Storage;

pub async fn run(db_path: &str, start_url: &str) -> Result<()> {
    let storage = Storage::new(db_path, 1).await?;
    let pages = storage.page_count(start_url).await?;
    let broken = storage.broken_count(start_url).await?;
    storage.close().await;

    println!("start_url: {start_url}");
    println!("pages crawled: {pages}");
    println!("broken links: {broken}");
    Ok(())
}
