//! Tool router: the catalogue every transport lists and invokes through.

use crate::config::{CoordinatorConfig, UpstreamServerConfig};
use crate::engine::Coordinator;
use crate::policy::{ensure_invocable, filter_tools, FilterStats, ToolClassifier};
use crate::tools::coordination::coordination_tools;
use crate::tools::local::{local_tools, LocalToolSettings};
use crate::tools::{ToolCategory, ToolDescriptor, ToolEntry};
use crate::upstream::{UpstreamClient, UpstreamToolHandler};
use hive_common::{ConnectionContext, HiveError, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of `tools/list` for one connection.
#[derive(Debug, Clone, Serialize)]
pub struct ToolListing {
    pub tools: Vec<ToolDescriptor>,
    #[serde(rename = "_meta")]
    pub meta: ListingMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingMeta {
    pub filter_stats: FilterStats,
}

/// Name-keyed tools in registration order.
#[derive(Debug, Default)]
struct ToolCatalog {
    order: Vec<String>,
    entries: HashMap<String, ToolEntry>,
}

impl ToolCatalog {
    fn insert(&mut self, entry: ToolEntry) -> bool {
        let name = entry.descriptor.name.clone();
        if self.entries.contains_key(&name) {
            return false;
        }
        self.order.push(name.clone());
        self.entries.insert(name, entry);
        true
    }

    fn iter(&self) -> impl Iterator<Item = &ToolEntry> {
        self.order.iter().filter_map(|name| self.entries.get(name))
    }
}

pub struct ToolRouter {
    coordinator: Arc<Coordinator>,
    catalog: RwLock<ToolCatalog>,
    classifier: ToolClassifier,
    upstreams: Mutex<Vec<Arc<UpstreamClient>>>,
}

impl ToolRouter {
    /// Router with the coordination and local tools registered.
    pub fn new(coordinator: Arc<Coordinator>, config: &CoordinatorConfig) -> Self {
        let router = Self {
            catalog: RwLock::new(ToolCatalog::default()),
            classifier: ToolClassifier::new(config.tools.local_only.iter().cloned()),
            upstreams: Mutex::new(Vec::new()),
            coordinator,
        };

        for entry in coordination_tools(&router.coordinator) {
            router.register(entry);
        }
        let settings = LocalToolSettings {
            workspace: config.workspace.clone(),
            terminal: config.terminal.clone(),
        };
        for entry in local_tools(settings) {
            router.register(entry);
        }

        info!(tools = router.len(), "Tool router initialized");
        router
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Add a tool. Returns `false` and keeps the existing tool on a name
    /// collision.
    pub fn register(&self, entry: ToolEntry) -> bool {
        let name = entry.descriptor.name.clone();
        let added = self.catalog.write().insert(entry);
        if !added {
            warn!(tool = %name, "Tool name already registered, skipping");
        }
        added
    }

    /// Connect every configured upstream server and register its tools.
    ///
    /// A server that fails to start is logged and skipped. Returns the
    /// number of proxied tools added.
    pub async fn connect_upstreams(&self, servers: &[UpstreamServerConfig]) -> usize {
        let mut added = 0;

        for server in servers {
            let client = match UpstreamClient::connect(server).await {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    warn!(upstream = %server.name, error = %e, "Skipping upstream server");
                    continue;
                }
            };

            let tools = match client.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(upstream = %server.name, error = %e, "Skipping upstream server");
                    client.shutdown();
                    continue;
                }
            };

            for tool in tools {
                let descriptor = ToolDescriptor::new(
                    tool.name.clone(),
                    tool.description,
                    tool.input_schema,
                    self.classifier.classify(&tool.name),
                    ToolCategory::Proxied,
                );
                let handler = Arc::new(UpstreamToolHandler::new(client.clone(), tool.name));
                if self.register(ToolEntry::new(descriptor, handler)) {
                    added += 1;
                }
            }

            info!(upstream = %server.name, "Upstream tools registered");
            self.upstreams.lock().push(client);
        }

        added
    }

    /// All descriptors in registration order, unfiltered.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.catalog
            .read()
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Tools visible to `context`, with filter statistics.
    pub fn list_tools(&self, context: &ConnectionContext) -> ToolListing {
        let all = self.descriptors();
        let (visible, filter_stats) = filter_tools(&all, context);

        debug!(
            connection_type = %context.connection_type,
            visible = filter_stats.visible_tools,
            filtered_out = filter_stats.filtered_out,
            "Listing tools"
        );

        ToolListing {
            tools: visible.into_iter().cloned().collect(),
            meta: ListingMeta { filter_stats },
        }
    }

    /// Invoke a tool by name on behalf of `context`.
    pub async fn invoke_tool(
        &self,
        name: &str,
        arguments: Value,
        context: &ConnectionContext,
    ) -> Result<Value> {
        let entry = self
            .catalog
            .read()
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| HiveError::UnknownTool(name.to_string()))?;

        if let Err(e) = ensure_invocable(&entry.descriptor, context) {
            warn!(tool = %name, connection_type = %context.connection_type, "Forbidden tool call rejected");
            return Err(e);
        }

        debug!(tool = %name, connection_type = %context.connection_type, "Invoking tool");
        entry.handler.call(arguments).await
    }

    pub fn len(&self) -> usize {
        self.catalog.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close upstream connections.
    pub fn shutdown(&self) {
        for client in self.upstreams.lock().drain(..) {
            client.shutdown();
        }
    }
}
