//! The rollout coordinator.
//!
//! Every wait is a bounded polling loop over eventually-consistent cluster
//! state. Transient client failures use up attempts of the same budget;
//! anything else stops the wait on the spot.

use std::sync::Arc;

use skiff_client::{ClientError, Resource, ResourceClient, ResourceKind};
use skiff_core::{
    ContainerStateTerminated, ContainerStatusExt, ControllerExt, ObjectExt, Pod, PodExt,
    PodPhase, ReplicationController, RetryPolicy, Service, ServiceExt, Workload,
};
use tracing::{debug, info, warn};

use crate::config::RolloutConfig;
use crate::error::{RolloutError, RolloutResult};
use crate::events::EventCursor;
use crate::readiness::Readiness;
use crate::retry::{Attempts, poll_until};
use crate::state::{Rollout, RolloutState};

/// Waiting reasons that mean the image will never arrive on its own.
const IMAGE_PULL_REASONS: &[&str] = &["ErrImagePull", "ImagePullBackOff", "InvalidImageName"];

/// Result of a successful [`Coordinator::deploy_and_wait`].
#[derive(Debug, Clone)]
pub struct Deployed {
    pub controller: ReplicationController,
    pub pod: Pod,
    pub rollout: Rollout,
}

pub struct Coordinator {
    client: Arc<dyn ResourceClient>,
    config: RolloutConfig,
}

impl Coordinator {
    pub fn new(client: Arc<dyn ResourceClient>, config: RolloutConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Arc<dyn ResourceClient> {
        &self.client
    }

    pub fn config(&self) -> &RolloutConfig {
        &self.config
    }

    /// Submit the workload's replication controller. With `force`, an
    /// existing controller of the same name is returned unchanged.
    pub async fn create_or_adopt(
        &self,
        workload: &Workload,
        force: bool,
    ) -> RolloutResult<ReplicationController> {
        let applied = self
            .client
            .create(workload.controller().into(), force)
            .await
            .map_err(collision)?;
        if applied.is_adopted() {
            info!(workload = %workload.name, "adopted existing replication controller");
        } else {
            info!(workload = %workload.name, image = %workload.image, "created replication controller");
        }
        Ok(applied.into_inner().into_controller()?)
    }

    /// Submit the workload's service, adopting an existing one under `force`.
    pub async fn create_or_adopt_endpoint(
        &self,
        workload: &Workload,
        force: bool,
    ) -> RolloutResult<Service> {
        let service = workload
            .service()
            .ok_or_else(|| RolloutError::MissingEndpoint(workload.name.clone()))?;
        let endpoint_type = service.endpoint_type();
        let applied = self
            .client
            .create(service.into(), force)
            .await
            .map_err(collision)?;
        if applied.is_adopted() {
            info!(workload = %workload.name, "adopted existing service");
        } else {
            info!(workload = %workload.name, %endpoint_type, "created service");
        }
        Ok(applied.into_inner().into_service()?)
    }

    /// Poll the controller until it reports at least one replica.
    pub async fn wait_for_replica_scheduled(
        &self,
        controller: &ReplicationController,
        policy: RetryPolicy,
    ) -> RolloutResult<ReplicationController> {
        let client = self.client.as_ref();
        let name = controller.name();
        let found = poll_until(policy, "replicas", |_| async move {
            let rc = client
                .get(ResourceKind::ReplicationController, name)
                .await?
                .into_controller()?;
            Ok::<_, RolloutError>((rc.observed_replicas() > 0).then_some(rc))
        })
        .await?;
        let rc = found
            .ok_or_else(|| RolloutError::ReplicasNotCreated(name.to_string(), policy.max_retries()))?;
        debug!(controller = name, replicas = rc.observed_replicas(), "replicas created");
        Ok(rc)
    }

    /// Poll for a pod matching the controller's selector. When several
    /// match, the one with the smallest name wins.
    pub async fn wait_for_pod_scheduled(
        &self,
        controller: &ReplicationController,
        policy: RetryPolicy,
    ) -> RolloutResult<Pod> {
        let client = self.client.as_ref();
        let selector = controller.selector();
        let selector = &selector;
        let found = poll_until(policy, "pod scheduled", |_| async move {
            let pods = client
                .list(ResourceKind::Pod, selector)
                .await?
                .into_iter()
                .map(Resource::into_pod)
                .collect::<Result<Vec<_>, ClientError>>()?;
            Ok::<_, RolloutError>(pods.into_iter().min_by(|a, b| a.name().cmp(b.name())))
        })
        .await?;
        let pod = found.ok_or_else(|| {
            RolloutError::PodNotScheduled(controller.name().to_string(), policy.max_retries())
        })?;
        info!(controller = controller.name(), pod = pod.name(), "pod scheduled");
        Ok(pod)
    }

    /// Poll the pod until it runs, failing fast on image pull errors and on
    /// containers that terminate first. New pod events are logged as they
    /// show up.
    pub async fn wait_for_pod_running(&self, pod: &Pod, policy: RetryPolicy) -> RolloutResult<Pod> {
        let name = pod.name();
        let mut cursor = EventCursor::new();
        let mut attempts = Attempts::new(policy);
        let mut last = pod.clone();

        while let Some(attempt) = attempts.next().await {
            let current = match self.client.get(ResourceKind::Pod, name).await {
                Ok(resource) => resource.into_pod()?,
                Err(e) if e.is_transient() => {
                    debug!(pod = name, attempt, error = %e, "pod lookup failed, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let uid = current.object_uid().or(pod.object_uid());
            if let Some(uid) = uid {
                self.surface_events(name, uid, &mut cursor).await;
            }

            let phase = current.phase();
            if phase == PodPhase::Running {
                info!(pod = name, attempt, "pod running");
                tokio::time::sleep(self.config.running_settle).await;
                return Ok(current);
            }

            if let Some(container) = current.main_container() {
                if let Some(waiting) = container.waiting() {
                    let reason = waiting.reason.as_deref().unwrap_or_default();
                    if IMAGE_PULL_REASONS.contains(&reason) {
                        return Err(RolloutError::ImagePull {
                            pod: name.to_string(),
                            image: container.image.clone(),
                            reason: reason.to_string(),
                            message: waiting.message.clone().unwrap_or_default(),
                        });
                    }
                }
                if let Some(terminated) = container.terminated() {
                    return Err(RolloutError::Terminated {
                        pod: name.to_string(),
                        detail: describe_terminated(terminated),
                    });
                }
            }
            if matches!(phase, PodPhase::Failed | PodPhase::Succeeded) {
                return Err(RolloutError::Terminated {
                    pod: name.to_string(),
                    detail: format!("pod phase {phase}"),
                });
            }

            debug!(pod = name, attempt, max = attempts.max(), %phase, "waiting for pod to run");
            last = current;
        }

        Err(RolloutError::PodStartTimeout {
            pod: name.to_string(),
            phase: last.phase(),
            detail: last_known_reason(&last),
        })
    }

    async fn surface_events(&self, pod: &str, uid: &str, cursor: &mut EventCursor) {
        let events = match self.client.list_events(uid).await {
            Ok(events) => events,
            Err(e) => {
                warn!(pod, error = %e, "failed listing pod events");
                return;
            }
        };
        for event in cursor.fresh(&events) {
            let reason = event.reason.as_deref().unwrap_or_default();
            let message = event.message.as_deref().unwrap_or_default();
            if reason == "Pulling" {
                info!(pod, message, "pulling image, this may take a while");
            } else {
                info!(pod, reason, message, "pod event");
            }
        }
    }

    /// Wait until the service is reachable according to its endpoint type.
    /// Cluster-local services have no observable signal and are reported
    /// ready after the configured grace period.
    pub async fn wait_for_service_ready(
        &self,
        service: &Service,
        policy: RetryPolicy,
    ) -> RolloutResult<Service> {
        let name = service.name();
        let readiness = Readiness::for_endpoint(
            &service.endpoint_type(),
            name,
            self.config.cluster_local_grace,
        )?;
        if let Some(grace) = readiness.grace() {
            info!(service = name, grace_ms = grace.as_millis() as u64, "cluster-local service, waiting grace period");
            tokio::time::sleep(grace).await;
        }

        let client = self.client.as_ref();
        let found = poll_until(policy, "service ready", |_| async move {
            let svc = client.get(ResourceKind::Service, name).await?.into_service()?;
            Ok::<_, RolloutError>(readiness.is_ready(&svc).then_some(svc))
        })
        .await?;
        let svc = found
            .ok_or_else(|| RolloutError::ServiceNotReady(name.to_string(), policy.max_retries()))?;
        info!(service = name, "service ready");
        Ok(svc)
    }

    /// Create (or adopt) the workload's controller and wait until its pod runs.
    pub async fn deploy_and_wait(&self, workload: &Workload, force: bool) -> RolloutResult<Deployed> {
        let mut rollout = Rollout::new(&workload.name);
        match self.run_compute(workload, force, &mut rollout).await {
            Ok((controller, pod)) => Ok(Deployed {
                controller,
                pod,
                rollout,
            }),
            Err(e) => {
                rollout.fail_with(&e);
                Err(e)
            }
        }
    }

    async fn run_compute(
        &self,
        workload: &Workload,
        force: bool,
        rollout: &mut Rollout,
    ) -> RolloutResult<(ReplicationController, Pod)> {
        let controller = self.create_or_adopt(workload, force).await?;
        let controller = self
            .wait_for_replica_scheduled(&controller, self.config.replicas)
            .await?;
        rollout.advance(RolloutState::ScheduledWithReplica);
        let pod = self
            .wait_for_pod_scheduled(&controller, self.config.pod_scheduled)
            .await?;
        rollout.advance(RolloutState::PodScheduled);
        let pod = self.wait_for_pod_running(&pod, self.config.pod_running).await?;
        rollout.advance(RolloutState::PodRunning);
        Ok((controller, pod))
    }

    /// Create (or adopt) the workload's service and wait until it is ready.
    pub async fn deploy_endpoint_and_wait(
        &self,
        workload: &Workload,
        force: bool,
    ) -> RolloutResult<Service> {
        let mut rollout = Rollout::new(&workload.name);
        let result = async {
            let service = self.create_or_adopt_endpoint(workload, force).await?;
            self.wait_for_service_ready(&service, self.config.service_ready)
                .await
        }
        .await;
        match result {
            Ok(service) => {
                rollout.advance(RolloutState::ServiceReady);
                Ok(service)
            }
            Err(e) => {
                rollout.fail_with(&e);
                Err(e)
            }
        }
    }
}

fn collision(e: ClientError) -> RolloutError {
    match e {
        ClientError::Conflict { kind, name } => RolloutError::NameCollision { kind, name },
        other => other.into(),
    }
}

fn describe_terminated(t: &ContainerStateTerminated) -> String {
    format!(
        "reason:{}; message:{}; exit code:{}",
        t.reason.as_deref().unwrap_or_default(),
        t.message.as_deref().unwrap_or_default(),
        t.exit_code
    )
}

fn last_known_reason(pod: &Pod) -> String {
    let Some(container) = pod.main_container() else {
        return String::new();
    };
    if let Some(waiting) = container.waiting() {
        return format!(
            ". container still waiting. reason:{}; message:{}",
            waiting.reason.as_deref().unwrap_or_default(),
            waiting.message.as_deref().unwrap_or_default()
        );
    }
    if let Some(terminated) = container.terminated() {
        return format!(". container terminated. {}", describe_terminated(terminated));
    }
    String::new()
}
