use std::time::Duration;

use tracing::info;
use tracing::warn;

use crate::channel::CommandChannel;
use crate::channel::CommandOutcome;
use crate::commands;
use crate::context::ProvisioningContext;
use crate::error::ProvisionError;
use crate::extract::controller_missing;
use crate::extract::extract_endpoint;
use crate::extract::extract_initial_password;
use crate::extract::pods_ready;

/// States of the automatic pipeline, in issue order. Linear except for the
/// fresh-install branch taken when the controller is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    UpdateKubeconfig,
    CreateNamespace,
    CheckController,
    InstallController,
    AwaitReadiness,
    ConfirmVersion,
    FetchEndpoint,
    FetchInitialPassword,
}

impl PipelineStep {
    pub fn label(self) -> &'static str {
        match self {
            PipelineStep::UpdateKubeconfig => "update kubeconfig",
            PipelineStep::CreateNamespace => "create namespace",
            PipelineStep::CheckController => "check controller",
            PipelineStep::InstallController => "install controller",
            PipelineStep::AwaitReadiness => "await controller readiness",
            PipelineStep::ConfirmVersion => "confirm controller version",
            PipelineStep::FetchEndpoint => "fetch controller endpoint",
            PipelineStep::FetchInitialPassword => "fetch initial password",
        }
    }
}

const STEP_LOGIN: &str = "controller login";
const STEP_REGISTER_REPOSITORY: &str = "register repository";
const STEP_CREATE_APPLICATION: &str = "create application";

/// Bounded poll replacing the original blind post-install delay: re-issue
/// the pod listing until a running pod appears or attempts run out.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPoll {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReadinessPoll {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 24,
        }
    }
}

/// Result of the terminal pipeline state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Whether the controller was installed by this run (as opposed to
    /// already present on the cluster).
    pub installed_fresh: bool,
    pub endpoint: String,
    /// Absent when the credential could not be read, e.g. because it was
    /// already rotated; the pipeline still completes.
    pub initial_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineRun {
    Completed(PipelineOutcome),
    /// The context was already initialized; nothing was issued.
    Skipped,
}

/// Sequences the bootstrap over a [`CommandChannel`], one command in flight
/// at a time, branching on textual output.
pub struct Provisioner<C> {
    channel: C,
    readiness: ReadinessPoll,
}

impl<C: CommandChannel> Provisioner<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            readiness: ReadinessPoll::default(),
        }
    }

    pub fn with_readiness(channel: C, readiness: ReadinessPoll) -> Self {
        Self { channel, readiness }
    }

    /// Run the automatic pipeline once. Re-entry on an initialized context
    /// is a no-op so dialog re-renders cannot re-issue the bootstrap.
    pub async fn run_pipeline(
        &mut self,
        ctx: &mut ProvisioningContext,
    ) -> Result<PipelineRun, ProvisionError> {
        if ctx.has_initialized {
            return Ok(PipelineRun::Skipped);
        }
        ctx.has_initialized = true;

        self.run_strict(
            PipelineStep::UpdateKubeconfig.label(),
            &commands::update_kubeconfig(&ctx.cluster, &ctx.region),
        )
        .await?;

        // Tolerated: the namespace usually already exists on reruns.
        let namespace_outcome = self
            .run(
                PipelineStep::CreateNamespace.label(),
                &commands::create_namespace(&ctx.namespace),
            )
            .await?;
        if !namespace_outcome.success() {
            warn!(
                namespace = ctx.namespace,
                exit_code = namespace_outcome.exit_code,
                "namespace creation failed; assuming it already exists"
            );
        }

        // The exit code is irrelevant here: a missing namespace makes the
        // listing fail, and that failure output is exactly the marker for
        // the fresh-install branch.
        let listing = self
            .run(
                PipelineStep::CheckController.label(),
                &commands::list_controller_pods(),
            )
            .await?;

        let installed_fresh = controller_missing(&listing.output);
        if installed_fresh {
            self.run_strict(
                PipelineStep::InstallController.label(),
                &commands::install_controller(),
            )
            .await?;
            self.await_readiness().await?;
        } else if let Err(error) = self
            .run(
                PipelineStep::ConfirmVersion.label(),
                &commands::controller_version(),
            )
            .await
        {
            // Best-effort confirmation only.
            warn!(%error, "could not confirm controller version");
        }

        let service = self
            .run(
                PipelineStep::FetchEndpoint.label(),
                &commands::describe_controller_service(),
            )
            .await?;
        let endpoint = extract_endpoint(&service.output);
        ctx.extracted_endpoint = Some(endpoint.clone());

        // Tolerated: the credential may already have been rotated.
        let initial_password = match self
            .run(
                PipelineStep::FetchInitialPassword.label(),
                &commands::initial_password(),
            )
            .await
        {
            Ok(outcome) if outcome.success() => extract_initial_password(&outcome.output),
            Ok(_) | Err(_) => {
                warn!("initial password unavailable; it may already have been rotated");
                None
            }
        };
        ctx.extracted_initial_password = initial_password.clone();

        info!(endpoint, installed_fresh, "provisioning pipeline reached ready state");
        Ok(PipelineRun::Completed(PipelineOutcome {
            installed_fresh,
            endpoint,
            initial_password,
        }))
    }

    /// Operator-triggered: authenticate to the installed controller. Both
    /// extracted values must be present; otherwise this fails locally
    /// without touching the channel.
    pub async fn login(
        &mut self,
        ctx: &ProvisioningContext,
    ) -> Result<CommandOutcome, ProvisionError> {
        let (Some(endpoint), Some(password)) = (
            ctx.extracted_endpoint.as_deref(),
            ctx.extracted_initial_password.as_deref(),
        ) else {
            return Err(ProvisionError::CredentialsUnavailable);
        };
        self.run_strict(STEP_LOGIN, &commands::login(endpoint, password))
            .await
    }

    /// Operator-triggered: register the source repository, then create the
    /// application resource. Creation is never attempted unless
    /// registration succeeded.
    pub async fn register_and_create(
        &mut self,
        ctx: &ProvisioningContext,
    ) -> Result<(), ProvisionError> {
        let repository_url = require(ctx.repository_url.as_deref(), "repository URL")?;
        let credentials = ctx
            .git_credentials
            .as_ref()
            .ok_or(ProvisionError::MissingField {
                field: "git credentials",
            })?;
        require(Some(credentials.username.as_str()), "git username")?;
        require(Some(credentials.token.as_str()), "git token")?;

        let normalized = commands::normalize_repository_url(repository_url);
        self.run_strict(
            STEP_REGISTER_REPOSITORY,
            &commands::register_repository(normalized, &credentials.username, &credentials.token),
        )
        .await?;

        let folder = require(ctx.source_folder.as_deref(), "source folder")?;
        let mut parts = folder.split('/');
        let (Some(_repo), Some(folder_name)) = (parts.next(), parts.next()) else {
            return Err(ProvisionError::InvalidSourceFolder {
                folder: folder.to_string(),
            });
        };
        let app_name = folder_name.to_lowercase();

        self.run_strict(
            STEP_CREATE_APPLICATION,
            &commands::create_application(&app_name, normalized, folder_name, &ctx.namespace),
        )
        .await?;
        Ok(())
    }

    async fn await_readiness(&mut self) -> Result<(), ProvisionError> {
        let ReadinessPoll {
            interval,
            max_attempts,
        } = self.readiness;
        for attempt in 1..=max_attempts {
            let listing = self
                .run(
                    PipelineStep::AwaitReadiness.label(),
                    &commands::list_controller_pods(),
                )
                .await?;
            if pods_ready(&listing.output) {
                info!(attempt, "controller pods are running");
                return Ok(());
            }
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(ProvisionError::ControllerNotReady {
            attempts: max_attempts,
        })
    }

    async fn run(
        &mut self,
        step: &'static str,
        command: &str,
    ) -> Result<CommandOutcome, ProvisionError> {
        info!(step, command, "issuing command");
        self.channel
            .run_command(command)
            .await
            .map_err(|source| ProvisionError::channel(step, source))
    }

    async fn run_strict(
        &mut self,
        step: &'static str,
        command: &str,
    ) -> Result<CommandOutcome, ProvisionError> {
        let outcome = self.run(step, command).await?;
        if outcome.success() {
            Ok(outcome)
        } else {
            Err(ProvisionError::StepFailed {
                step,
                exit_code: outcome.exit_code,
            })
        }
    }
}

fn require<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ProvisionError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ProvisionError::MissingField { field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelError;
    use crate::context::GitCredentials;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    const RUNNING_PODS: &str =
        "NAME                READY   STATUS    RESTARTS   AGE\nargocd-server-abc   1/1     Running   0          2m";
    const PENDING_PODS: &str =
        "NAME                READY   STATUS    RESTARTS   AGE\nargocd-server-abc   0/1     Pending   0          5s";
    const NO_RESOURCES: &str = "No resources found in argocd namespace.";
    const SERVICE_WITH_EXTERNAL: &str = "NAME            TYPE           CLUSTER-IP   EXTERNAL-IP   PORT(S)        AGE\nargocd-server   LoadBalancer   10.0.0.5     34.1.2.3      80:30080/TCP   5m";

    struct ScriptedChannel {
        responses: VecDeque<Result<CommandOutcome, ChannelError>>,
        issued: Vec<String>,
    }

    impl ScriptedChannel {
        fn new(responses: Vec<Result<CommandOutcome, ChannelError>>) -> Self {
            Self {
                responses: responses.into(),
                issued: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl CommandChannel for ScriptedChannel {
        async fn run_command(&mut self, command: &str) -> Result<CommandOutcome, ChannelError> {
            self.issued.push(command.to_string());
            self.responses
                .pop_front()
                .unwrap_or_else(|| panic!("unexpected command issued: {command}"))
        }
    }

    fn ok(output: &str) -> Result<CommandOutcome, ChannelError> {
        Ok(CommandOutcome {
            output: output.to_string(),
            exit_code: 0,
        })
    }

    fn failed(output: &str, exit_code: i32) -> Result<CommandOutcome, ChannelError> {
        Ok(CommandOutcome {
            output: output.to_string(),
            exit_code,
        })
    }

    fn fast_poll() -> ReadinessPoll {
        ReadinessPoll {
            interval: Duration::ZERO,
            max_attempts: 5,
        }
    }

    fn context() -> ProvisioningContext {
        ProvisioningContext::new("demo-cluster", "us-east-1", "team-apps")
    }

    #[tokio::test]
    async fn fresh_install_branch_installs_and_polls_until_ready() {
        let channel = ScriptedChannel::new(vec![
            ok(""),                      // update kubeconfig
            ok("namespace/team-apps created"),
            ok(NO_RESOURCES),            // check controller -> fresh branch
            ok("configured"),            // install manifest
            ok(PENDING_PODS),            // poll 1
            ok(RUNNING_PODS),            // poll 2
            ok(SERVICE_WITH_EXTERNAL),   // fetch endpoint
            ok("s3cretvalue\n"),         // initial password
        ]);
        let mut provisioner = Provisioner::with_readiness(channel, fast_poll());
        let mut ctx = context();

        let run = provisioner.run_pipeline(&mut ctx).await.expect("pipeline");

        assert_eq!(
            run,
            PipelineRun::Completed(PipelineOutcome {
                installed_fresh: true,
                endpoint: "34.1.2.3".to_string(),
                initial_password: Some("s3cretvalue".to_string()),
            })
        );
        assert_eq!(ctx.extracted_endpoint.as_deref(), Some("34.1.2.3"));
        assert_eq!(ctx.extracted_initial_password.as_deref(), Some("s3cretvalue"));
        assert_eq!(
            provisioner.channel.issued,
            vec![
                "aws eks update-kubeconfig --name demo-cluster --region us-east-1",
                "kubectl create namespace team-apps",
                "kubectl get pods -n argocd",
                "kubectl apply -n argocd -f https://raw.githubusercontent.com/argoproj/argo-cd/stable/manifests/install.yaml",
                "kubectl get pods -n argocd",
                "kubectl get pods -n argocd",
                "kubectl get svc argocd-server -n argocd",
                "argocd admin initial-password -n argocd",
            ]
        );
    }

    #[tokio::test]
    async fn existing_install_branch_confirms_version_instead() {
        let channel = ScriptedChannel::new(vec![
            ok(""),
            ok("namespace/team-apps created"),
            ok(RUNNING_PODS),            // controller already present
            ok("argocd: v2.10.0"),       // version check
            ok(SERVICE_WITH_EXTERNAL),
            ok("s3cretvalue\n"),
        ]);
        let mut provisioner = Provisioner::with_readiness(channel, fast_poll());
        let mut ctx = context();

        let run = provisioner.run_pipeline(&mut ctx).await.expect("pipeline");

        let PipelineRun::Completed(outcome) = run else {
            panic!("expected completed run");
        };
        assert!(!outcome.installed_fresh);
        assert!(
            provisioner
                .channel
                .issued
                .contains(&"argocd version".to_string())
        );
        assert!(
            !provisioner
                .channel
                .issued
                .iter()
                .any(|cmd| cmd.starts_with("kubectl apply"))
        );
    }

    #[tokio::test]
    async fn kubeconfig_failure_aborts_before_any_other_step() {
        let channel = ScriptedChannel::new(vec![failed("unable to locate credentials", 255)]);
        let mut provisioner = Provisioner::with_readiness(channel, fast_poll());
        let mut ctx = context();

        let error = provisioner
            .run_pipeline(&mut ctx)
            .await
            .expect_err("pipeline should abort");

        assert!(matches!(
            error,
            ProvisionError::StepFailed {
                step: "update kubeconfig",
                exit_code: 255,
            }
        ));
        assert_eq!(provisioner.channel.issued.len(), 1);
    }

    #[tokio::test]
    async fn namespace_already_exists_is_tolerated() {
        let channel = ScriptedChannel::new(vec![
            ok(""),
            failed("Error from server (AlreadyExists): namespaces \"team-apps\" already exists", 1),
            ok(RUNNING_PODS),
            ok("argocd: v2.10.0"),
            ok(SERVICE_WITH_EXTERNAL),
            failed("Error: failed to get initial password", 1), // tolerated too
        ]);
        let mut provisioner = Provisioner::with_readiness(channel, fast_poll());
        let mut ctx = context();

        let run = provisioner.run_pipeline(&mut ctx).await.expect("pipeline");

        let PipelineRun::Completed(outcome) = run else {
            panic!("expected completed run");
        };
        assert_eq!(outcome.initial_password, None);
        assert_eq!(ctx.extracted_initial_password, None);
    }

    #[tokio::test]
    async fn pipeline_runs_exactly_once_per_context() {
        let channel = ScriptedChannel::new(vec![
            ok(""),
            ok(""),
            ok(RUNNING_PODS),
            ok("argocd: v2.10.0"),
            ok(SERVICE_WITH_EXTERNAL),
            ok("s3cretvalue\n"),
        ]);
        let mut provisioner = Provisioner::with_readiness(channel, fast_poll());
        let mut ctx = context();

        provisioner.run_pipeline(&mut ctx).await.expect("first run");
        let issued_after_first = provisioner.channel.issued.len();
        let rerun = provisioner.run_pipeline(&mut ctx).await.expect("second run");

        assert_eq!(rerun, PipelineRun::Skipped);
        assert_eq!(provisioner.channel.issued.len(), issued_after_first);
    }

    #[tokio::test]
    async fn readiness_poll_gives_up_after_max_attempts() {
        let channel = ScriptedChannel::new(vec![
            ok(""),
            ok(""),
            ok(NO_RESOURCES),
            ok("configured"),
            ok(PENDING_PODS),
            ok(PENDING_PODS),
            ok(PENDING_PODS),
        ]);
        let mut provisioner = Provisioner::with_readiness(
            channel,
            ReadinessPoll {
                interval: Duration::ZERO,
                max_attempts: 3,
            },
        );
        let mut ctx = context();

        let error = provisioner
            .run_pipeline(&mut ctx)
            .await
            .expect_err("pipeline should give up");

        assert!(matches!(
            error,
            ProvisionError::ControllerNotReady { attempts: 3 }
        ));
    }

    #[tokio::test]
    async fn login_without_extracted_values_is_a_local_error() {
        let channel = ScriptedChannel::new(vec![]);
        let mut provisioner = Provisioner::new(channel);
        let ctx = context();

        let error = provisioner.login(&ctx).await.expect_err("login should fail");

        assert!(matches!(error, ProvisionError::CredentialsUnavailable));
        assert!(provisioner.channel.issued.is_empty());
    }

    #[tokio::test]
    async fn login_issues_the_login_command() {
        let channel = ScriptedChannel::new(vec![ok("'admin:login' logged in successfully")]);
        let mut provisioner = Provisioner::new(channel);
        let mut ctx = context();
        ctx.extracted_endpoint = Some("34.1.2.3".to_string());
        ctx.extracted_initial_password = Some("s3cretvalue".to_string());

        provisioner.login(&ctx).await.expect("login");

        assert_eq!(
            provisioner.channel.issued,
            vec!["argocd login 34.1.2.3 --username admin --password s3cretvalue --insecure"]
        );
    }

    #[tokio::test]
    async fn register_without_repository_url_issues_nothing() {
        let channel = ScriptedChannel::new(vec![]);
        let mut provisioner = Provisioner::new(channel);
        let mut ctx = context();
        ctx.repository_url = Some(String::new());
        ctx.git_credentials = Some(GitCredentials {
            username: "dev".to_string(),
            token: "tok".to_string(),
        });

        let error = provisioner
            .register_and_create(&ctx)
            .await
            .expect_err("should fail locally");

        assert!(matches!(
            error,
            ProvisionError::MissingField {
                field: "repository URL"
            }
        ));
        assert!(provisioner.channel.issued.is_empty());
    }

    #[tokio::test]
    async fn register_normalizes_url_and_creates_application() {
        let channel = ScriptedChannel::new(vec![
            ok("Repository 'https://example/org/repo' added"),
            ok("application 'payments' created"),
        ]);
        let mut provisioner = Provisioner::new(channel);
        let mut ctx = context();
        ctx.repository_url = Some("https://example/org/repo.git".to_string());
        ctx.source_folder = Some("repo/Payments".to_string());
        ctx.git_credentials = Some(GitCredentials {
            username: "dev".to_string(),
            token: "tok".to_string(),
        });

        provisioner.register_and_create(&ctx).await.expect("sub-flow");

        assert_eq!(
            provisioner.channel.issued,
            vec![
                "argocd repo add https://example/org/repo --username dev --password tok --upsert",
                "argocd app create payments --repo https://example/org/repo --path Payments \
                 --dest-server https://kubernetes.default.svc --dest-namespace team-apps",
            ]
        );
    }

    #[tokio::test]
    async fn failed_registration_short_circuits_application_creation() {
        let channel = ScriptedChannel::new(vec![failed("FATA[0000] repository not accessible", 1)]);
        let mut provisioner = Provisioner::new(channel);
        let mut ctx = context();
        ctx.repository_url = Some("https://example/org/repo.git".to_string());
        ctx.source_folder = Some("repo/payments".to_string());
        ctx.git_credentials = Some(GitCredentials {
            username: "dev".to_string(),
            token: "tok".to_string(),
        });

        let error = provisioner
            .register_and_create(&ctx)
            .await
            .expect_err("registration failure must short-circuit");

        assert!(matches!(
            error,
            ProvisionError::StepFailed {
                step: "register repository",
                ..
            }
        ));
        assert_eq!(provisioner.channel.issued.len(), 1);
    }

    #[tokio::test]
    async fn malformed_source_folder_is_rejected_after_registration() {
        let channel = ScriptedChannel::new(vec![ok("Repository added")]);
        let mut provisioner = Provisioner::new(channel);
        let mut ctx = context();
        ctx.repository_url = Some("https://example/org/repo".to_string());
        ctx.source_folder = Some("payments".to_string()); // no repo/ prefix
        ctx.git_credentials = Some(GitCredentials {
            username: "dev".to_string(),
            token: "tok".to_string(),
        });

        let error = provisioner
            .register_and_create(&ctx)
            .await
            .expect_err("folder without repo prefix is invalid");

        assert!(matches!(
            error,
            ProvisionError::InvalidSourceFolder { .. }
        ));
        assert_eq!(provisioner.channel.issued.len(), 1);
    }
}
