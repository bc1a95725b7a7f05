//! Heuristic parsing of command output into structured values.
//!
//! These are best-effort rules over the known fixed-width tabular output of
//! the underlying tools and must be re-validated whenever a tool changes
//! its output format.

/// Used when no usable address appears in the service listing.
pub const ENDPOINT_FALLBACK: &str = "localhost";

const PLACEHOLDER_NONE: &str = "<none>";
const PLACEHOLDER_PENDING: &str = "<pending>";

/// Pick the controller endpoint out of a `kubectl get svc` listing: the row
/// after the header, external address column first, internal address column
/// as fallback, loopback when the table is unusable.
pub fn extract_endpoint(service_output: &str) -> String {
    let lines: Vec<&str> = service_output.lines().collect();
    if lines.len() > 1 {
        let columns: Vec<&str> = lines[1].split_whitespace().collect();
        if columns.len() > 4 {
            let external = columns[3];
            if !external.is_empty()
                && external != PLACEHOLDER_NONE
                && external != PLACEHOLDER_PENDING
            {
                return external.to_string();
            }
            let internal = columns[2];
            if !internal.is_empty() {
                return internal.to_string();
            }
        }
    }
    ENDPOINT_FALLBACK.to_string()
}

/// The initial admin credential is the first non-empty line, verbatim.
pub fn extract_initial_password(output: &str) -> Option<String> {
    output
        .trim()
        .lines()
        .next()
        .map(str::to_string)
        .filter(|line| !line.is_empty())
}

/// Whether a pod listing indicates the controller is absent. Case-sensitive
/// on purpose: both markers are literal tool output.
pub fn controller_missing(pod_listing: &str) -> bool {
    pod_listing.contains("No resources found") || pod_listing.contains("Error")
}

/// Whether a pod listing shows at least one running pod. Drives the
/// post-install readiness poll.
pub fn pods_ready(pod_listing: &str) -> bool {
    if controller_missing(pod_listing) {
        return false;
    }
    pod_listing
        .lines()
        .skip(1)
        .any(|row| row.split_whitespace().nth(2) == Some("Running"))
}
