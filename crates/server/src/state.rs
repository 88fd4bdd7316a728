use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use db::{
    AnalysisResultRepository, CompanyRepository, DocumentRepository, PhasePromptRepository,
    ReferenceDocumentRepository,
};
use events::EventBus;
use llm::{
    ChatClient, DisabledRetriever, FunctionRetriever, OpenAiCompatClient, ProviderEndpoint,
    Retriever,
};
use orchestrator::{AnalysisAdjuster, ExecutorConfig, PhaseOrchestrator};
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::routes::sse::{
    spawn_event_recorder, EventBuffer, SharedEventBuffer, DEFAULT_EVENT_BUFFER_SIZE,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub prompts: PhasePromptRepository,
    pub reference_documents: ReferenceDocumentRepository,
    pub results: AnalysisResultRepository,
    pub documents: DocumentRepository,
    pub companies: CompanyRepository,
    pub orchestrator: Arc<PhaseOrchestrator>,
    pub adjuster: Arc<AnalysisAdjuster>,
    pub event_bus: EventBus,
    pub event_buffer: SharedEventBuffer,
    pub app_dir: Option<PathBuf>,
}

impl AppState {
    /// Wires repositories and services over an already migrated pool.
    pub fn new(
        pool: SqlitePool,
        chat: Arc<dyn ChatClient>,
        retriever: Arc<dyn Retriever>,
        executor: ExecutorConfig,
    ) -> Self {
        let event_bus = EventBus::new();
        let event_buffer = Arc::new(RwLock::new(EventBuffer::new(DEFAULT_EVENT_BUFFER_SIZE)));
        spawn_event_recorder(&event_bus, Arc::clone(&event_buffer));

        let prompts = PhasePromptRepository::new(pool.clone());
        let reference_documents = ReferenceDocumentRepository::new(pool.clone());
        let results = AnalysisResultRepository::new(pool.clone());

        let orchestrator = PhaseOrchestrator::new(
            Arc::clone(&chat),
            retriever,
            prompts.clone(),
            reference_documents.clone(),
            results.clone(),
        )
        .with_config(executor)
        .with_event_bus(event_bus.clone());

        let adjuster = AnalysisAdjuster::new(chat, results.clone())
            .with_event_bus(event_bus.clone())
            .with_phase_locks(orchestrator.phase_locks());

        Self {
            prompts,
            reference_documents,
            results,
            documents: DocumentRepository::new(pool.clone()),
            companies: CompanyRepository::new(pool.clone()),
            pool,
            orchestrator: Arc::new(orchestrator),
            adjuster: Arc::new(adjuster),
            event_bus,
            event_buffer,
            app_dir: None,
        }
    }

    /// Opens the database named by `config`, applies migrations and builds
    /// the provider clients.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        if let Some(dir) = database_dir(&config.database.url) {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let pool = db::create_pool(&config.database.url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.url))?;
        db::run_migrations(&pool)
            .await
            .context("Failed to run database migrations")?;

        let chat = OpenAiCompatClient::new(
            ProviderEndpoint::new(&config.llm.openai_base_url, config.llm.openai_api_key.clone()),
            ProviderEndpoint::new(
                &config.llm.deepseek_base_url,
                config.llm.deepseek_api_key.clone(),
            ),
        )
        .with_max_retries(config.llm.max_retries);

        let retriever: Arc<dyn Retriever> = match &config.retrieval.functions_url {
            Some(url) => {
                let mut retriever =
                    FunctionRetriever::new(url, config.retrieval.anon_key.clone())
                        .with_index_api_key(config.retrieval.index_api_key.clone());
                if let Some(top_k) = config.retrieval.top_k {
                    retriever = retriever.with_top_k(top_k);
                }
                Arc::new(retriever)
            }
            None => Arc::new(DisabledRetriever),
        };

        let executor = ExecutorConfig::default().with_default_model(&config.llm.default_model);
        let state = Self::new(pool, Arc::new(chat), retriever, executor);

        Ok(match &config.server.app_dir {
            Some(dir) => state.with_app_dir(dir.clone()),
            None => state,
        })
    }

    pub fn with_app_dir(mut self, app_dir: PathBuf) -> Self {
        self.app_dir = Some(app_dir);
        self
    }
}

/// Directory holding a file-backed SQLite database, if any.
fn database_dir(url: &str) -> Option<PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?
        .split('?')
        .next()?;
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
