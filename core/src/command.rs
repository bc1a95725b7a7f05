/// Well-known tool families recognized in submitted commands. Domain tools
/// still run as child processes like any generic command; the class only
/// feeds tracing so operator transcripts can be filtered by tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainTool {
    Git,
    Terraform,
    Kubernetes,
    GitOps,
}

impl DomainTool {
    pub fn label(self) -> &'static str {
        match self {
            DomainTool::Git => "git",
            DomainTool::Terraform => "terraform",
            DomainTool::Kubernetes => "kubernetes",
            DomainTool::GitOps => "gitops",
        }
    }

    fn from_program(program: &str) -> Option<Self> {
        match program {
            "git" => Some(DomainTool::Git),
            "terraform" => Some(DomainTool::Terraform),
            "kubectl" | "helm" => Some(DomainTool::Kubernetes),
            "argocd" => Some(DomainTool::GitOps),
            _ => None,
        }
    }
}

/// One newline-delimited unit of a submission, classified for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubCommand {
    /// `cd <target>`, handled in process; mutates the session.
    ChangeDir { target: String },
    /// `ls` with no arguments, listed synchronously in process.
    ListDir,
    /// `clear`, answered with a terminal reset sequence.
    ClearScreen,
    /// Everything else runs as a child process.
    Spawn {
        line: String,
        tool: Option<DomainTool>,
    },
}

/// Split submitted text into trimmed, non-empty sub-commands. Pasted
/// multi-line input becomes a sequence of independent commands, not one
/// compound instruction.
pub fn split_submission(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Classify one sub-command. `line` must already be trimmed.
pub fn classify(line: &str) -> SubCommand {
    if let Some(target) = line.strip_prefix("cd ") {
        return SubCommand::ChangeDir {
            target: target.trim().to_string(),
        };
    }
    match line {
        "ls" => SubCommand::ListDir,
        "clear" => SubCommand::ClearScreen,
        _ => SubCommand::Spawn {
            line: line.to_string(),
            tool: first_program(line).as_deref().and_then(DomainTool::from_program),
        },
    }
}

/// First shell token of a command line, with any leading path stripped.
/// Used both for domain-tool classification and allow-list checks.
pub(crate) fn first_program(line: &str) -> Option<String> {
    let tokens = shlex::split(line)?;
    let first = tokens.first()?;
    let basename = first.rsplit(['/', '\\']).next().unwrap_or(first);
    Some(basename.to_string())
}
