//! Subjects and bodies of the alerts sent at each transition.

/// An alert ready to hand to the notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub subject: &'static str,
    pub body: String,
}

pub fn down(url: &str, failures: u32, host: &str) -> Alert {
    Alert {
        subject: "Website DOWN alert",
        body: format!("{url} has failed {failures} consecutive checks on host {host}."),
    }
}

pub fn recovered(url: &str, status: u16, host: &str) -> Alert {
    Alert {
        subject: "Website recovered",
        body: format!("{url} is responding again (status {status}). Host: {host}"),
    }
}

pub fn recovered_after_restart(url: &str, status: u16) -> Alert {
    Alert {
        subject: "Website recovered after restart",
        body: format!("{url} recovered after restart (status {status})."),
    }
}

pub fn rebooting(url: &str, host: &str) -> Alert {
    Alert {
        subject: "Host REBOOTING due to persistent failure",
        body: format!("{url} did not recover; rebooting host {host} now."),
    }
}
