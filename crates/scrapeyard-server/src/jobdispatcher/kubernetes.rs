// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Kubernetes batch/v1 Job dispatcher.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec as K8sJobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, DeleteParams, PostParams};
use tracing::{debug, info};

use super::{JobDispatcher, JobDispatcherError, JobSpec, Result};

/// Retries before the scheduler gives up on a failing run.
const BACKOFF_LIMIT: i32 = 5;

const CPU_REQUEST: &str = "250m";
const CPU_LIMIT: &str = "1000m";

/// Dispatcher creating one batch Job per run in a fixed namespace.
#[derive(Clone)]
pub struct KubernetesJobDispatcher {
    client: Client,
    namespace: String,
}

impl KubernetesJobDispatcher {
    /// Connect using in-cluster or kubeconfig credentials.
    pub async fn connect(namespace: impl Into<String>) -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client, namespace))
    }

    /// Use an existing client.
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn jobs(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

/// Build the Job object for a run.
pub(crate) fn build_job(spec: &JobSpec, namespace: &str) -> Result<Job> {
    let deadline = i64::try_from(spec.max_run_time)
        .map_err(|_| JobDispatcherError::InvalidJob("max_run_time out of range".to_string()))?;
    let memory = Quantity(spec.memory.to_string());

    let requests = BTreeMap::from([
        ("memory".to_string(), memory.clone()),
        ("cpu".to_string(), Quantity(CPU_REQUEST.to_string())),
    ]);
    let limits = BTreeMap::from([
        ("memory".to_string(), memory),
        ("cpu".to_string(), Quantity(CPU_LIMIT.to_string())),
    ]);

    let env = spec
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect::<Vec<_>>();

    let container = Container {
        name: spec.run_id.clone(),
        image: Some(spec.image.clone()),
        command: Some(spec.command.clone()),
        env: if env.is_empty() { None } else { Some(env) },
        resources: Some(ResourceRequirements {
            requests: Some(requests),
            limits: Some(limits),
            ..Default::default()
        }),
        ..Default::default()
    };

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(spec.run_id.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([
                ("app".to_string(), "scrapeyard-run".to_string()),
                ("scrapeyard.io/run-id".to_string(), spec.run_id.clone()),
            ])),
            ..Default::default()
        },
        spec: Some(K8sJobSpec {
            backoff_limit: Some(BACKOFF_LIMIT),
            active_deadline_seconds: Some(deadline),
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    automount_service_account_token: Some(false),
                    restart_policy: Some("OnFailure".to_string()),
                    containers: vec![container],
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[async_trait]
impl JobDispatcher for KubernetesJobDispatcher {
    fn dispatcher_type(&self) -> &'static str {
        "kubernetes"
    }

    async fn create(&self, spec: &JobSpec) -> Result<()> {
        let job = build_job(spec, &self.namespace)?;
        self.jobs().create(&PostParams::default(), &job).await?;
        info!(
            run_id = %spec.run_id,
            namespace = %self.namespace,
            max_run_time = spec.max_run_time,
            memory = spec.memory,
            "Job created"
        );
        Ok(())
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        match self.jobs().delete(run_id, &DeleteParams::foreground()).await {
            Ok(_) => {
                info!(run_id, "Job deleted");
                Ok(())
            }
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!(run_id, "Job already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
