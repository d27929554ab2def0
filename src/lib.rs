//! Astro language server core.
//!
//! Documents are parsed into frontmatter, markup and embedded blocks, compiled to
//! synthetic TypeScript sources with an offset mapping back to the document, and
//! served to a type checker through that mapping.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock, RwLock};

use dashmap::DashMap;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService};

pub mod checker;
mod document;
pub mod error;
mod lsp;
pub mod parser;
pub mod resolution;
pub mod settings;
pub mod virtual_code;

pub use checker::{CancellationToken, ImportChecker, NullChecker, TypeChecker};
pub use document::{Document, DocumentSnapshot, DocumentStore, LineIndex};
pub use error::{Error, Result as AstroResult};
pub use lsp::{
    checker_to_diagnostics, compile_to_diagnostics, completion_at_position, document_diagnostics,
    hover_at_position,
};
pub use resolution::{ModuleResolutionCache, Resolution};
pub use settings::{build_language_module, discover_settings, load_settings, Settings};
pub use virtual_code::{LanguageModule, SyntheticSource};

pub struct Backend {
    client: Client,
    documents: DocumentStore,
    workspace_root: OnceLock<PathBuf>,
    language: RwLock<Arc<LanguageModule>>,
    resolutions: Arc<ModuleResolutionCache>,
    checker: Arc<dyn TypeChecker>,
    /// Token of the latest diagnostics run per document.
    pending: Arc<DashMap<Url, CancellationToken>>,
}

impl Backend {
    pub(crate) fn new(client: Client) -> Self {
        let resolutions = Arc::new(ModuleResolutionCache::new());
        Self {
            client,
            documents: DocumentStore::new(),
            workspace_root: OnceLock::new(),
            language: RwLock::new(Arc::new(LanguageModule::default())),
            checker: Arc::new(ImportChecker::new(Arc::clone(&resolutions))),
            resolutions,
            pending: Arc::new(DashMap::new()),
        }
    }

    fn language(&self) -> Arc<LanguageModule> {
        match self.language.read() {
            Ok(language) => Arc::clone(&language),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn set_language(&self, language: LanguageModule) {
        match self.language.write() {
            Ok(mut current) => *current = Arc::new(language),
            Err(poisoned) => *poisoned.into_inner() = Arc::new(language),
        }
    }

    /// Load astrols.toml from the workspace and rebuild the language module.
    fn load_settings(&self) {
        let Some(root) = self.workspace_root.get() else {
            return;
        };
        let (settings, settings_dir) = settings::discover_settings(root);
        tracing::info!("using settings from {}", settings_dir.display());
        self.set_language(settings::build_language_module(&settings, &settings_dir));
    }

    /// Compute and publish diagnostics in the background, superseding any run still
    /// in flight for the same document.
    fn schedule_diagnostics(&self, uri: Url, snapshot: Arc<DocumentSnapshot>) {
        let token = CancellationToken::new();
        if let Some(previous) = self.pending.insert(uri.clone(), token.clone()) {
            previous.cancel();
        }

        let client = self.client.clone();
        let checker = Arc::clone(&self.checker);
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            let cancel = token.clone();
            let task_snapshot = Arc::clone(&snapshot);
            let result = tokio::task::spawn_blocking(move || {
                lsp::document_diagnostics(&task_snapshot, checker.as_ref(), &cancel)
            })
            .await;

            pending.remove_if(&uri, |_, current| current.is_same(&token));
            let diagnostics = match result {
                Ok(Some(diagnostics)) if !token.is_cancelled() => diagnostics,
                Ok(_) => return,
                Err(e) => {
                    tracing::warn!("diagnostics for {} failed: {}", uri, e);
                    return;
                }
            };
            client
                .publish_diagnostics(uri, diagnostics, Some(snapshot.client_version))
                .await;
        });
    }

    fn refresh_all(&self) {
        for uri in self.documents.uris() {
            if let Some(snapshot) = self.documents.get(&uri) {
                self.schedule_diagnostics(uri, snapshot);
            }
        }
    }

    async fn register_file_watchers(&self) {
        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![
                FileSystemWatcher {
                    glob_pattern: GlobPattern::String(
                        "**/*.{astro,ts,tsx,mts,js,mjs}".to_string(),
                    ),
                    kind: None,
                },
                FileSystemWatcher {
                    glob_pattern: GlobPattern::String(format!("**/{}", settings::SETTINGS_FILE)),
                    kind: None,
                },
            ],
        };
        let registration = Registration {
            id: "astrols-watched-files".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(options).ok(),
        };
        if let Err(e) = self.client.register_capability(vec![registration]).await {
            tracing::warn!("file watcher registration failed: {}", e);
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| f.uri.to_file_path().ok())
            .or_else(|| {
                #[allow(deprecated)]
                params.root_uri.as_ref()?.to_file_path().ok()
            });

        if let Some(root) = workspace_root {
            let _ = self.workspace_root.set(root);
            self.load_settings();
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![".".to_string(), "<".to_string()]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.register_file_watchers().await;
        self.client
            .log_message(MessageType::INFO, "Astro language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        for entry in self.pending.iter() {
            entry.value().cancel();
        }
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let snapshot = self.documents.open(
            uri.clone(),
            params.text_document.text,
            params.text_document.version,
            &self.language(),
        );
        self.schedule_diagnostics(uri, snapshot);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let Some(snapshot) = self.documents.update(
            &uri,
            &params.content_changes,
            params.text_document.version,
            &self.language(),
        ) else {
            tracing::warn!("change for unopened document {}", uri);
            return;
        };
        self.schedule_diagnostics(uri, snapshot);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some((_, token)) = self.pending.remove(&uri) {
            token.cancel();
        }
        self.documents.close(&uri);
        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let mut settings_changed = false;
        for change in &params.changes {
            let Ok(path) = change.uri.to_file_path() else {
                continue;
            };
            self.resolutions.invalidate(&path);
            if path.file_name().is_some_and(|name| name == settings::SETTINGS_FILE) {
                settings_changed = true;
            }
        }

        if settings_changed {
            self.load_settings();
            for (uri, snapshot) in self.documents.rederive_all(&self.language()) {
                self.schedule_diagnostics(uri, snapshot);
            }
        } else {
            self.refresh_all();
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = &params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(snapshot) = self.documents.get(uri) else {
            return Ok(None);
        };
        Ok(lsp::hover_at_position(&snapshot, self.checker.as_ref(), position))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(snapshot) = self.documents.get(uri) else {
            tracing::debug!("completion for unopened document {}", uri);
            return Ok(None);
        };
        Ok(lsp::completion_at_position(&snapshot, self.checker.as_ref(), position))
    }
}

/// Install the global tracing subscriber writing to stderr.
///
/// The filter comes from `ASTROLS_LOG`, then `level`, then `info`.
pub fn init_logging(level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = std::env::var("ASTROLS_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| level.and_then(|directives| EnvFilter::try_new(directives).ok()))
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

pub fn create_service() -> (LspService<Backend>, tower_lsp::ClientSocket) {
    LspService::new(Backend::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_can_be_created() {
        let (_service, _socket) = create_service();
    }

    #[test]
    fn logging_init_is_idempotent() {
        init_logging(Some("debug"));
        init_logging(Some("not a [valid filter"));
    }
}
