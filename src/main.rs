// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crawlcore::config::settings::Settings;
use crawlcore::domain::repositories::task_store::MemoryTaskStore;
use crawlcore::engines::reqwest_transport::ReqwestTransport;
use crawlcore::infrastructure::metrics;
use crawlcore::utils::telemetry;
use crawlcore::workers::manager::CrawlSession;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并运行爬取会话
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting crawlcore...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    if settings.metrics.enabled {
        metrics::init_metrics(&settings.metrics.listen_addr);
    }

    if settings.crawler.seeds.is_empty() {
        anyhow::bail!(
            "No seed URLs configured; set crawler.seeds in a config file or CRAWLCORE__CRAWLER__SEEDS"
        );
    }

    // 3. Initialize collaborators
    // The in-memory store is the default; deployments with durable
    // persistence plug their own TaskStore implementation here
    let transport = Arc::new(ReqwestTransport::new()?);
    let store = Arc::new(MemoryTaskStore::new());

    // 4. Build the crawl session
    let session = Arc::new(CrawlSession::new(settings.clone(), store, transport));
    let restored = session.resume().await?;
    if restored > 0 {
        info!("Resumed {} pending tasks", restored);
    }
    let seeded = session.seed(&settings.crawler.seeds).await?;
    info!("Seeded {} URLs", seeded);

    // 5. Cancel cleanly on Ctrl-C
    {
        let session = session.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                session.cancel();
            }
        });
    }

    // 6. Run to completion
    let report = session.run().await?;
    info!("Crawl report: {}", serde_json::to_string(&report)?);

    Ok(())
}
