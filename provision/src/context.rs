/// Git credentials used to register a source repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCredentials {
    pub username: String,
    pub token: String,
}

/// State owned by one provisioning dialog.
#[derive(Debug, Clone, Default)]
pub struct ProvisioningContext {
    pub cluster: String,
    pub region: String,
    pub namespace: String,
    pub repository_url: Option<String>,
    /// Selected source folder in `repo/folder` form.
    pub source_folder: Option<String>,
    pub git_credentials: Option<GitCredentials>,
    /// Service endpoint extracted from the controller's service listing.
    pub extracted_endpoint: Option<String>,
    /// Initial admin credential, if it could still be read.
    pub extracted_initial_password: Option<String>,
    /// Guards the automatic pipeline so it runs exactly once per dialog,
    /// even under re-entry.
    pub(crate) has_initialized: bool,
}

impl ProvisioningContext {
    pub fn new(
        cluster: impl Into<String>,
        region: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            region: region.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn has_initialized(&self) -> bool {
        self.has_initialized
    }
}
