//! Command lines issued by the orchestrator. Kept in one place because the
//! extraction heuristics in [`crate::extract`] are coupled to the textual
//! output of exactly these invocations.

/// Namespace the controller itself lives in (distinct from the deployment
/// target namespace chosen in the dialog).
pub const CONTROLLER_NAMESPACE: &str = "argocd";

pub const CONTROLLER_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/argoproj/argo-cd/stable/manifests/install.yaml";

/// In-cluster API server address used as the application destination.
pub const KUBERNETES_INTERNAL_API: &str = "https://kubernetes.default.svc";

pub fn update_kubeconfig(cluster: &str, region: &str) -> String {
    format!("aws eks update-kubeconfig --name {cluster} --region {region}")
}

pub fn create_namespace(namespace: &str) -> String {
    format!("kubectl create namespace {namespace}")
}

pub fn list_controller_pods() -> String {
    format!("kubectl get pods -n {CONTROLLER_NAMESPACE}")
}

pub fn install_controller() -> String {
    format!("kubectl apply -n {CONTROLLER_NAMESPACE} -f {CONTROLLER_MANIFEST_URL}")
}

pub fn controller_version() -> String {
    "argocd version".to_string()
}

pub fn describe_controller_service() -> String {
    format!("kubectl get svc argocd-server -n {CONTROLLER_NAMESPACE}")
}

pub fn initial_password() -> String {
    format!("argocd admin initial-password -n {CONTROLLER_NAMESPACE}")
}

pub fn login(endpoint: &str, password: &str) -> String {
    format!("argocd login {endpoint} --username admin --password {password} --insecure")
}

pub fn register_repository(repository_url: &str, username: &str, token: &str) -> String {
    format!("argocd repo add {repository_url} --username {username} --password {token} --upsert")
}

pub fn create_application(app_name: &str, repository_url: &str, path: &str, namespace: &str) -> String {
    format!(
        "argocd app create {app_name} --repo {repository_url} --path {path} \
         --dest-server {KUBERNETES_INTERNAL_API} --dest-namespace {namespace}"
    )
}

/// Registered repository URLs never carry the `.git` suffix.
pub fn normalize_repository_url(url: &str) -> &str {
    url.strip_suffix(".git").unwrap_or(url)
}
