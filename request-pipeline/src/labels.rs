//! Label vocabulary the pipeline writes to the code host.
//!
//! Application is namespace-replacing: putting `agent:approved` on an issue
//! removes any other `agent:*` label first (see code-host-engine).

use code_host_engine::Label;

pub fn agent_approved() -> Label {
    Label::new("agent:approved", "2da44e")
}

pub fn agent_rejected() -> Label {
    Label::new("agent:rejected", "cf222e")
}

pub fn agent_needs_info() -> Label {
    Label::new("agent:needs-info", "bf8700")
}

pub fn copilot_implementing() -> Label {
    Label::new("copilot:implementing", "8250df")
}

pub fn copilot_complete() -> Label {
    Label::new("copilot:complete", "2da44e")
}

pub fn review_approved() -> Label {
    Label::new("review:approved", "2da44e")
}

pub fn review_changes_requested() -> Label {
    Label::new("review:changes-requested", "d93f0b")
}

pub fn deploy_staged() -> Label {
    Label::new("deploy:staged", "0e8a16")
}
