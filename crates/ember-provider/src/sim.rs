//! Deterministic in-memory compute provider.
//!
//! `SimCompute` stands in for the real provider in tests and dry runs.
//! Operation timelines are scriptable per submitted call, instances
//! materialize in the listing when their create operation reaches DONE,
//! and every call is counted so tests can assert exactly how many
//! create/delete requests a flow issued.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use ember_core::ClusterIdentity;

use crate::client::ComputeProvider;
use crate::error::{ProviderError, ProviderResult};
use crate::types::{
    FirewallRule, Image, Instance, InstanceRequest, Operation, OperationError, OperationStatus,
};

/// Scripted in-memory provider.
///
/// The handle returned by insert/delete always reads PENDING; the
/// scripted timeline is observed through `get_operation`, one entry per
/// poll, with the final entry repeating once reached. Unscripted
/// operations resolve DONE on the first poll.
#[derive(Default)]
pub struct SimCompute {
    state: Mutex<SimState>,
}

#[derive(Default)]
struct SimState {
    instances: HashMap<String, Instance>,
    operations: HashMap<String, OpTimeline>,
    scripts: VecDeque<OpScript>,
    operation_faults: VecDeque<ProviderError>,
    spawn_addresses: Option<(String, String)>,
    hidden_lists: u32,
    op_seq: u64,
    addr_seq: u8,
    insert_calls: u64,
    delete_calls: u64,
    list_calls: u64,
    firewall_inserts: u64,
}

#[derive(Default)]
struct OpScript {
    statuses: Vec<OperationStatus>,
    error_code: Option<String>,
}

struct OpTimeline {
    steps: VecDeque<Operation>,
    terminal: Operation,
    effect: Option<OpEffect>,
}

enum OpEffect {
    Materialize { key: String, instance: Instance },
    Remove { key: String },
}

impl OpTimeline {
    fn new(id: &str, script: OpScript, effect: OpEffect) -> Self {
        let statuses = if script.statuses.is_empty() {
            vec![OperationStatus::Done]
        } else {
            script.statuses
        };
        let steps: VecDeque<Operation> = statuses
            .iter()
            .map(|status| Operation {
                id: id.to_string(),
                status: *status,
                error: match (status, &script.error_code) {
                    (OperationStatus::Done, Some(code)) => Some(OperationError::with_code(code)),
                    _ => None,
                },
            })
            .collect();
        let terminal = steps.back().cloned().unwrap_or_else(|| Operation {
            id: id.to_string(),
            status: OperationStatus::Done,
            error: None,
        });
        OpTimeline {
            steps,
            terminal,
            effect: Some(effect),
        }
    }

    fn advance(&mut self) -> Operation {
        self.steps.pop_front().unwrap_or_else(|| self.terminal.clone())
    }
}

fn instance_key(project: &str, zone: &str, name: &str) -> String {
    format!("{}/{}/{}", project, zone, name)
}

impl SimCompute {
    pub fn new() -> Self {
        SimCompute::default()
    }

    /// Queue the status timeline for the next submitted operation. When
    /// `error_code` is set it rides on every DONE entry, making the
    /// operation a terminal failure.
    pub async fn script_operation(
        &self,
        statuses: Vec<OperationStatus>,
        error_code: Option<&str>,
    ) {
        let mut state = self.state.lock().await;
        state.scripts.push_back(OpScript {
            statuses,
            error_code: error_code.map(str::to_string),
        });
    }

    /// Fail the next `n` calls to `get_operation` with a transport error.
    pub async fn inject_operation_faults(&self, n: u32) {
        let mut state = self.state.lock().await;
        for _ in 0..n {
            state
                .operation_faults
                .push_back(ProviderError::Transport("connection reset".to_string()));
        }
    }

    /// Return an empty listing for the next `n` calls, regardless of
    /// which instances exist.
    pub async fn hide_listings(&self, n: u32) {
        self.state.lock().await.hidden_lists = n;
    }

    /// Override the addresses the next created instance materializes
    /// with, instead of the synthesized defaults.
    pub async fn set_spawn_addresses(&self, external: &str, internal: &str) {
        self.state.lock().await.spawn_addresses =
            Some((external.to_string(), internal.to_string()));
    }

    /// Seed an instance as already existing with the given addresses.
    pub async fn seed_instance(&self, identity: &ClusterIdentity, external: &str, internal: &str) {
        let mut state = self.state.lock().await;
        state.instances.insert(
            instance_key(&identity.project, &identity.zone, &identity.name),
            Instance::addressed(&identity.name, external, internal),
        );
    }

    /// Seed an instance that exists but has no network interfaces yet,
    /// the shape a listing reports mid-provision.
    pub async fn seed_bare_instance(&self, identity: &ClusterIdentity) {
        let mut state = self.state.lock().await;
        state.instances.insert(
            instance_key(&identity.project, &identity.zone, &identity.name),
            Instance {
                name: identity.name.clone(),
                status: Some("PROVISIONING".to_string()),
                network_interfaces: Vec::new(),
            },
        );
    }

    pub async fn has_instance(&self, identity: &ClusterIdentity) -> bool {
        let state = self.state.lock().await;
        state
            .instances
            .contains_key(&instance_key(&identity.project, &identity.zone, &identity.name))
    }

    pub async fn insert_calls(&self) -> u64 {
        self.state.lock().await.insert_calls
    }

    pub async fn delete_calls(&self) -> u64 {
        self.state.lock().await.delete_calls
    }

    pub async fn list_calls(&self) -> u64 {
        self.state.lock().await.list_calls
    }

    pub async fn firewall_inserts(&self) -> u64 {
        self.state.lock().await.firewall_inserts
    }
}

#[async_trait]
impl ComputeProvider for SimCompute {
    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        request: &InstanceRequest,
    ) -> ProviderResult<Operation> {
        let mut state = self.state.lock().await;
        state.insert_calls += 1;
        state.op_seq += 1;
        state.addr_seq += 1;
        let id = format!("op-{}", state.op_seq);
        let (external, internal) = state.spawn_addresses.take().unwrap_or_else(|| {
            (
                format!("203.0.113.{}", state.addr_seq),
                format!("10.0.0.{}", state.addr_seq),
            )
        });
        let instance = Instance::addressed(&request.name, &external, &internal);
        let script = state.scripts.pop_front().unwrap_or_default();
        let timeline = OpTimeline::new(
            &id,
            script,
            OpEffect::Materialize {
                key: instance_key(project, zone, &request.name),
                instance,
            },
        );
        state.operations.insert(id.clone(), timeline);
        Ok(Operation {
            id,
            status: OperationStatus::Pending,
            error: None,
        })
    }

    async fn delete_instance(&self, identity: &ClusterIdentity) -> ProviderResult<Operation> {
        let mut state = self.state.lock().await;
        state.delete_calls += 1;
        let key = instance_key(&identity.project, &identity.zone, &identity.name);
        if !state.instances.contains_key(&key) {
            return Err(ProviderError::NotFound(format!("instance {}", identity)));
        }
        state.op_seq += 1;
        let id = format!("op-{}", state.op_seq);
        let script = state.scripts.pop_front().unwrap_or_default();
        let timeline = OpTimeline::new(&id, script, OpEffect::Remove { key });
        state.operations.insert(id.clone(), timeline);
        Ok(Operation {
            id,
            status: OperationStatus::Pending,
            error: None,
        })
    }

    async fn get_operation(
        &self,
        _project: &str,
        _zone: &str,
        id: &str,
    ) -> ProviderResult<Operation> {
        let mut state = self.state.lock().await;
        if let Some(fault) = state.operation_faults.pop_front() {
            return Err(fault);
        }
        let (operation, effect) = {
            let timeline = state
                .operations
                .get_mut(id)
                .ok_or_else(|| ProviderError::NotFound(format!("operation {}", id)))?;
            let operation = timeline.advance();
            let effect = if operation.is_done() && operation.error.is_none() {
                timeline.effect.take()
            } else {
                None
            };
            (operation, effect)
        };
        match effect {
            Some(OpEffect::Materialize { key, instance }) => {
                state.instances.insert(key, instance);
            }
            Some(OpEffect::Remove { key }) => {
                state.instances.remove(&key);
            }
            None => {}
        }
        Ok(operation)
    }

    async fn list_instances(&self, project: &str, zone: &str) -> ProviderResult<Vec<Instance>> {
        let mut state = self.state.lock().await;
        state.list_calls += 1;
        if state.hidden_lists > 0 {
            state.hidden_lists -= 1;
            return Ok(Vec::new());
        }
        let prefix = format!("{}/{}/", project, zone);
        Ok(state
            .instances
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, instance)| instance.clone())
            .collect())
    }

    async fn get_image_from_family(&self, project: &str, family: &str) -> ProviderResult<Image> {
        Ok(Image {
            self_link: format!("projects/{}/global/images/family/{}", project, family),
        })
    }

    async fn insert_firewall_rule(
        &self,
        _project: &str,
        _rule: &FirewallRule,
    ) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.firewall_inserts += 1;
        Ok(())
    }
}
