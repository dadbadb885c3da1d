use futures::future::BoxFuture;
use futures::FutureExt;
use k8s_openapi::api::core::v1::Pod;
use kube_client::api::LogParams;
use kube_client::{Api, Client};
use serde::{Deserialize, Serialize};

use crate::Result;

/// The container whose logs a tab shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogTarget {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    /// Logs of the previous, terminated container instance.
    #[serde(default)]
    pub previous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRequest {
    /// Number of most recent lines to return; all lines when `None`.
    pub tail_lines: Option<i64>,
}

/// Fetches log text whose lines are prefixed with RFC 3339 timestamps.
pub trait LogSource: Send + Sync {
    fn fetch<'a>(&'a self, target: &'a LogTarget, request: LogRequest) -> BoxFuture<'a, Result<String>>;
}

/// [`LogSource`] reading pod logs from the cluster.
#[derive(Clone)]
pub struct PodLogSource {
    client: Client,
}

impl PodLogSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl LogSource for PodLogSource {
    fn fetch<'a>(&'a self, target: &'a LogTarget, request: LogRequest) -> BoxFuture<'a, Result<String>> {
        async move {
            let pods = Api::<Pod>::namespaced(self.client.clone(), &target.namespace);
            let params = LogParams {
                container: target.container.clone(),
                previous: target.previous,
                tail_lines: request.tail_lines,
                timestamps: true,
                ..LogParams::default()
            };
            Ok(pods.logs(&target.pod, &params).await?)
        }
        .boxed()
    }
}
