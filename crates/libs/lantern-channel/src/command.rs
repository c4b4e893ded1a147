//! Slash-command surface for the channel layer.
//!
//! Commands are whitespace-tokenized. Failures never escape as errors;
//! anything the user got wrong becomes a system message in the log.

use crate::keystore::KeyStoreBackend;
use crate::store::ChannelStore;

impl<B: KeyStoreBackend> ChannelStore<B> {
    /// Handle a user-typed command such as `/join #mesh`.
    pub fn process_command(&mut self, command: &str, peer_id: &str) {
        let mut tokens = command.split_whitespace();
        let Some(verb) = tokens.next() else {
            return;
        };

        match verb.to_ascii_lowercase().as_str() {
            "/join" | "/j" => {
                let Some(name) = tokens.next() else {
                    self.push_system_message("Usage: /join <#channel>".to_string());
                    return;
                };
                if let Err(error) = self.join_channel(name, None, peer_id) {
                    self.push_system_message(error.to_string());
                }
            }
            _ => {
                self.push_system_message(format!("Unknown command: {command}"));
            }
        }
    }
}
