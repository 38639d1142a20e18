//! Listener façade — what the harness needs from the ingestion endpoint.

use listener::ListenerHandle;

pub trait ListenerFacade: Send + Sync {
    /// Forget every received line and any recorded error.
    fn reset(&self);

    /// Endpoint the plugin should ship to.
    fn address(&self) -> (String, u16);

    fn has_received(&self, line: &str) -> bool;

    /// Ingestion-side error recorded since the last reset, rendered for reports.
    fn last_error(&self) -> Option<String>;

    /// Total lines received, duplicates included.
    fn received_count(&self) -> usize;

    /// How many times `line` arrived.
    fn count_of(&self, line: &str) -> u64;

    /// Lines received under `token`, in arrival order.
    fn received_for_token(&self, token: &str) -> Vec<String>;

    fn url(&self) -> String {
        let (host, port) = self.address();
        format!("http://{}:{}", host, port)
    }
}

impl ListenerFacade for ListenerHandle {
    fn reset(&self) {
        self.state().reset();
    }

    fn address(&self) -> (String, u16) {
        ListenerHandle::address(self)
    }

    fn has_received(&self, line: &str) -> bool {
        self.state().has_received(line)
    }

    fn last_error(&self) -> Option<String> {
        self.state().last_error().map(|e| e.to_string())
    }

    fn received_count(&self) -> usize {
        self.state().received_count()
    }

    fn count_of(&self, line: &str) -> u64 {
        self.state().count_of(line)
    }

    fn received_for_token(&self, token: &str) -> Vec<String> {
        self.state().messages_for_token(token)
    }
}
