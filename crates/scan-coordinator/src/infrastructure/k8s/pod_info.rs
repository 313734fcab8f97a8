//! Translation of Kubernetes pods into model pods.

use api_types::Container;
use api_types::Image;
use api_types::Pod;
use k8s_openapi::api::core::v1::ContainerStatus;
use k8s_openapi::api::core::v1::Pod as KubePod;

const DIGEST_PREFIX: &str = "sha256:";

/// Extract the content digest from a container status `imageID`.
///
/// Accepts `<repo>@sha256:<hex>` (with or without a runtime prefix such as
/// `docker-pullable://`) and bare `sha256:<hex>`.
pub fn image_digest(image_id: &str) -> Option<&str> {
    let digest = match image_id.rsplit_once('@') {
        Some((_, digest)) => digest,
        None => image_id.strip_prefix("docker://").unwrap_or(image_id),
    };
    let hex = digest.strip_prefix(DIGEST_PREFIX)?;
    (!hex.is_empty()).then_some(digest)
}

fn container_from_status(status: &ContainerStatus) -> Option<Container> {
    let sha = image_digest(&status.image_id)?;
    Some(Container {
        name: status.name.clone(),
        image: Image::new(sha, status.image.clone()),
    })
}

/// Build a model pod from a k8s pod.
///
/// Returns `None` for pods without a name. Containers whose image digest is
/// not resolved yet are skipped; a later update will carry them.
pub fn pod_from_kube(pod: &KubePod) -> Option<Pod> {
    let metadata = &pod.metadata;
    let name = metadata.name.clone()?;
    let namespace = metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let containers = pod
        .status
        .as_ref()
        .and_then(|status| status.container_statuses.as_ref())
        .map(|statuses| statuses.iter().filter_map(container_from_status).collect())
        .unwrap_or_default();

    Some(Pod {
        name,
        namespace,
        uid: metadata.uid.clone().unwrap_or_default(),
        containers,
    })
}

/// `<namespace>/<name>` of a k8s pod, if it has a name.
pub fn kube_qualified_name(pod: &KubePod) -> Option<String> {
    let name = pod.metadata.name.as_deref()?;
    let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");
    Some(api_types::qualified_name(namespace, name))
}

#[cfg(test)]
pub(crate) mod test_support {
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    pub(crate) fn container_status(name: &str, image: &str, image_id: &str) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            image: image.to_string(),
            image_id: image_id.to_string(),
            ..Default::default()
        }
    }

    pub(crate) fn create_test_pod(name: &str, statuses: Vec<ContainerStatus>) -> KubePod {
        KubePod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some(format!("{name}-uid")),
                ..Default::default()
            },
            spec: None,
            status: Some(PodStatus {
                container_statuses: Some(statuses),
                ..Default::default()
            }),
        }
    }
}
