//! OpenShift backend — Machine API objects plus core nodes.
//!
//! Machine pools are `machine.openshift.io/v1beta1` MachineSets and
//! compute instances are Machines, both read as dynamic objects from a
//! single namespace. Replica counts are written with a JSON merge patch
//! on `spec.replicas`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use serde_json::{Value, json};
use tracing::debug;

use fleetscale_core::{ComputeInstance, MachinePool, NodeRecord, PlatformError, PlatformResult};

use crate::FleetPlatform;

const MACHINE_API_GROUP: &str = "machine.openshift.io";
const MACHINE_API_VERSION: &str = "v1beta1";

/// Convert any `Display` error into a `PlatformError` variant.
macro_rules! map_err {
    ($variant:ident) => {
        |e| PlatformError::$variant(e.to_string())
    };
}

/// Platform handle backed by a Kubernetes client.
#[derive(Clone)]
pub struct KubePlatform {
    client: Client,
    namespace: String,
    field_manager: String,
}

impl KubePlatform {
    pub fn new(client: Client, namespace: &str, field_manager: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            field_manager: field_manager.to_string(),
        }
    }

    /// Build a client from the ambient kubeconfig or in-cluster config.
    pub async fn try_default(namespace: &str, field_manager: &str) -> PlatformResult<Self> {
        let client = Client::try_default().await.map_err(map_err!(Client))?;
        debug!(%namespace, "kubernetes client ready");
        Ok(Self::new(client, namespace, field_manager))
    }

    fn machine_sets(&self) -> Api<DynamicObject> {
        let ar = machine_resource("MachineSet", "machinesets");
        Api::namespaced_with(self.client.clone(), &self.namespace, &ar)
    }

    fn machines(&self) -> Api<DynamicObject> {
        let ar = machine_resource("Machine", "machines");
        Api::namespaced_with(self.client.clone(), &self.namespace, &ar)
    }
}

#[async_trait]
impl FleetPlatform for KubePlatform {
    async fn list_pools(&self) -> PlatformResult<Vec<MachinePool>> {
        let list = self
            .machine_sets()
            .list(&ListParams::default())
            .await
            .map_err(map_err!(Api))?;
        list.items.iter().map(pool_from_object).collect()
    }

    async fn set_replicas(&self, pool: &str, replicas: u32) -> PlatformResult<()> {
        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..PatchParams::default()
        };
        let patch = json!({ "spec": { "replicas": replicas } });
        self.machine_sets()
            .patch(pool, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| match e {
                kube::Error::Api(ae) if ae.code == 404 => PlatformError::NotFound(pool.to_string()),
                other => PlatformError::Api(other.to_string()),
            })?;
        debug!(%pool, replicas, "machine set patched");
        Ok(())
    }

    async fn list_nodes(&self) -> PlatformResult<Vec<NodeRecord>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(map_err!(Api))?;
        Ok(list.items.iter().map(node_record).collect())
    }

    async fn list_instances(&self) -> PlatformResult<Vec<ComputeInstance>> {
        let list = self
            .machines()
            .list(&ListParams::default())
            .await
            .map_err(map_err!(Api))?;
        Ok(list.items.iter().map(instance_from_object).collect())
    }
}

fn machine_resource(kind: &str, plural: &str) -> ApiResource {
    let gvk = GroupVersionKind::gvk(MACHINE_API_GROUP, MACHINE_API_VERSION, kind);
    ApiResource::from_gvk_with_plural(&gvk, plural)
}

/// Read a MachineSet's name and `spec.replicas` (absent means zero).
fn pool_from_object(obj: &DynamicObject) -> PlatformResult<MachinePool> {
    let name = obj.name_any();
    let replicas = match obj.data.pointer("/spec/replicas") {
        None | Some(Value::Null) => 0,
        Some(value) => value
            .as_u64()
            .and_then(|r| u32::try_from(r).ok())
            .ok_or_else(|| PlatformError::Decode {
                kind: "MachineSet",
                name: name.clone(),
                reason: format!("spec.replicas is not a replica count: {value}"),
            })?,
    };
    Ok(MachinePool { name, replicas })
}

fn instance_from_object(obj: &DynamicObject) -> ComputeInstance {
    ComputeInstance {
        name: obj.name_any(),
        image: obj
            .data
            .pointer("/spec/providerSpec/value")
            .and_then(provider_image),
    }
}

/// Image identifier from a Machine's provider spec.
///
/// AWS stores it under `ami.id`, GCP under `disks[0].image`, and other
/// providers under `image` as a string or an object.
fn provider_image(value: &Value) -> Option<String> {
    let candidates = [
        value.pointer("/ami/id"),
        value.pointer("/disks/0/image"),
        value.get("image"),
        value.pointer("/image/id"),
        value.pointer("/image/resourceID"),
        value.pointer("/image/name"),
        value.pointer("/image/version"),
        value.pointer("/image/url"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

fn node_record(node: &Node) -> NodeRecord {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        });
    NodeRecord {
        name: node.name_any(),
        ready,
    }
}
