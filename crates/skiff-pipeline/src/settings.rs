//! Static configuration handed to the orchestrator in `NAZ_MS_CONF`.
//!
//! The document is a tree of nodes, each with optional `data` and named
//! `children`. Scalar settings are strings on the wire.

use std::collections::BTreeMap;

use serde::Serialize;

pub const SETTINGS_ENV: &str = "NAZ_MS_CONF";

const DB_NAME: &str = "postgres";
const DB_USER: &str = "postgres";
pub const DB_PASSWORD: &str = "nazsecret";
const SERVICE_QUEUES: [&str; 4] = [
    "deployed-application-events",
    "pending-deployed-application-events",
    "application-copy-events",
    "pending-application-copy-events",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<NodeData>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, ConfNode>,
}

impl ConfNode {
    fn leaf(data: NodeData) -> Self {
        Self {
            data: Some(data),
            children: BTreeMap::new(),
        }
    }

    fn child(&mut self, name: &str) -> &mut ConfNode {
        self.children.entry(name.to_string()).or_default()
    }

    fn insert(&mut self, section: &str, name: &str, data: NodeData) {
        self.child(section)
            .children
            .insert(name.to_string(), ConfNode::leaf(data));
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NodeData {
    Datasource(PostgresDatasource),
    Queue(PersistentQueue),
    WebServer(WebServer),
    Messaging(PersistentMessaging),
    Scheduler(PersistentScheduler),
    Service(ServiceConfig),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostgresDatasource {
    pub server: String,
    pub port: String,
    pub database_name: String,
    pub db_schema: String,
    pub max_connections: String,
    pub db_user: String,
    pub db_password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentQueue {
    pub destination_type: String,
    pub queue_name: String,
    pub memory_buffer_max_messages: String,
    pub seconds_to_sleep_between_message_retries: String,
    pub max_retries: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebServer {
    pub port: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentMessaging {
    pub datasource_name: String,
    pub persist_message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentScheduler {
    pub name: String,
    pub datasource_name: String,
    pub persist_tasks: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceLimit {
    #[serde(rename = "maxConnections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConsumer {
    pub number_of_consumers: u32,
    pub log_in_debug: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDestination {
    pub log_in_debug: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(rename = "serviceURI")]
    pub service_uri: String,
    pub route: String,
    pub global_logging_config: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data_source_config: BTreeMap<String, ResourceLimit>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub blobstore_config: BTreeMap<String, ResourceLimit>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub input_queue_config: BTreeMap<String, QueueConsumer>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub destination_queue_config: BTreeMap<String, QueueDestination>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

impl ServiceConfig {
    fn new(uri: &str) -> Self {
        Self {
            service_uri: uri.to_string(),
            route: format!("http://localhost:8080/{uri}-api"),
            global_logging_config: "DEBUG".to_string(),
            ..Default::default()
        }
    }

    fn datasource(mut self, name: &str) -> Self {
        self.data_source_config
            .insert(name.to_string(), ResourceLimit { max_connections: 2 });
        self
    }

    fn blobstore(mut self, name: &str) -> Self {
        self.blobstore_config
            .insert(name.to_string(), ResourceLimit { max_connections: 2 });
        self
    }

    /// Consume `queue` with `consumers` workers and publish to it.
    fn queue(mut self, queue: &str, consumers: u32) -> Self {
        self.input_queue_config.insert(
            queue.to_string(),
            QueueConsumer {
                number_of_consumers: consumers,
                log_in_debug: true,
            },
        );
        self.destination_queue_config
            .insert(queue.to_string(), QueueDestination { log_in_debug: true });
        self
    }

    fn parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    fn verbose(self, verbose: bool) -> Self {
        if verbose {
            self.parameter("print-all-json-requests", "true")
        } else {
            self
        }
    }
}

/// Inputs of the orchestrator's configuration document.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Cluster IP of the shared datastore.
    pub db_host: String,
    pub db_port: i32,
    pub site_name: String,
    pub verbose_logging: bool,
}

impl OrchestratorSettings {
    fn datasource(&self, schema: &str) -> NodeData {
        NodeData::Datasource(PostgresDatasource {
            server: self.db_host.clone(),
            port: self.db_port.to_string(),
            database_name: DB_NAME.to_string(),
            db_schema: schema.to_string(),
            max_connections: "2".to_string(),
            db_user: DB_USER.to_string(),
            db_password: DB_PASSWORD.to_string(),
        })
    }

    pub fn document(&self) -> ConfNode {
        let mut root = ConfNode::default();
        let verbose = self.verbose_logging;

        root.insert("webserver", "default", NodeData::WebServer(WebServer {
            port: "8080".to_string(),
        }));
        root.insert("messaging", "default-messaging", NodeData::Messaging(PersistentMessaging {
            datasource_name: "site-db".to_string(),
            persist_message: "true".to_string(),
        }));
        root.insert("scheduler", "default", NodeData::Scheduler(PersistentScheduler {
            name: "default".to_string(),
            datasource_name: "site-db".to_string(),
            persist_tasks: "true".to_string(),
        }));

        root.insert("datasource", "hub-db", self.datasource("hub_repository"));
        root.insert("datasource", "site-db", self.datasource("site_repository"));
        root.insert("datasource", "protection-db", self.datasource("protection_repository"));
        root.insert("blobstore", "image-store", self.datasource("central_blobstore"));
        root.insert("blobstore", "copy-store", self.datasource("central_blobstore"));

        for queue in SERVICE_QUEUES {
            root.insert("queue", queue, NodeData::Queue(PersistentQueue {
                destination_type: "QUEUE".to_string(),
                queue_name: queue.to_string(),
                memory_buffer_max_messages: "1000".to_string(),
                seconds_to_sleep_between_message_retries: "2".to_string(),
                max_retries: "2".to_string(),
            }));
        }

        let location = r#"{"latitude":32.1792126,"longitude":34.9005128,"name":"Israel","properties":{}}"#;
        let services = [
            ServiceConfig::new("hub").datasource("hub-db").verbose(verbose),
            ServiceConfig::new("hub-web").blobstore("image-store").verbose(verbose),
            ServiceConfig::new("site")
                .datasource("site-db")
                .queue("deployed-application-events", 5)
                .queue("pending-deployed-application-events", 1)
                .parameter("site-name", &self.site_name)
                .parameter("location", location)
                .verbose(verbose),
            ServiceConfig::new("protection")
                .datasource("protection-db")
                .queue("application-copy-events", 5)
                .queue("pending-application-copy-events", 1)
                .verbose(verbose),
            ServiceConfig::new("shpan-copy-store")
                .blobstore("copy-store")
                .verbose(verbose),
        ];
        for service in services {
            let uri = service.service_uri.clone();
            root.insert("serviceconfig", &uri, NodeData::Service(service));
        }
        root
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.document())
    }
}
