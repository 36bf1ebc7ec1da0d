//! UserInterface (UI) and the displays it drives.

use crate::schema::kinds;
use modelrt_core::{Attributes, InstanceId, InstanceRef, Notifiable, Runtime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInterfaceAttrs {
    pub display_status: String,
}

/// The machine's screen. Records what it last showed and forwards every
/// notification to a display.
pub struct UserInterface {
    handle: InstanceRef,
    attrs: Attributes<UserInterfaceAttrs>,
    display: Arc<dyn Notifiable>,
}

impl_entity!(UserInterface);

impl UserInterface {
    pub fn new(id: InstanceId, display: Arc<dyn Notifiable>) -> Self {
        Self {
            handle: InstanceRef::new(kinds::USER_INTERFACE, id),
            attrs: Attributes::new(UserInterfaceAttrs::default()),
            display,
        }
    }

    /// Creates and stores a UI that drives `display`.
    pub fn attach(runtime: &Runtime, display: Arc<dyn Notifiable>) -> Arc<UserInterface> {
        runtime.insert_plain(Arc::new(Self::new(InstanceId::generate(), display)))
    }

    pub fn display_status(&self) -> String {
        self.attrs.read().display_status.clone()
    }

    fn show(&self, status: &str) {
        self.attrs.write().display_status = status.to_string();
    }
}

impl Notifiable for UserInterface {
    fn show_message(&self, text: &str) {
        self.show(text);
        self.display.show_message(text);
    }

    fn show_error(&self, text: &str) {
        self.show(text);
        self.display.show_error(text);
    }

    fn show_qr(&self) {
        self.show("QR");
        self.display.show_qr();
    }
}

/// Display that writes notifications to the log.
#[derive(Debug, Default)]
pub struct TracingDisplay;

impl Notifiable for TracingDisplay {
    fn show_message(&self, text: &str) {
        tracing::info!("[UI] {}", text);
    }

    fn show_error(&self, text: &str) {
        tracing::warn!("[UI] error: {}", text);
    }

    fn show_qr(&self) {
        tracing::info!("[UI] showing payment QR code");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelrt_core::{EngineConfig, Entity};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Screen {
        lines: Mutex<Vec<String>>,
    }

    impl Notifiable for Screen {
        fn show_message(&self, text: &str) {
            self.lines.lock().push(format!("msg:{}", text));
        }

        fn show_error(&self, text: &str) {
            self.lines.lock().push(format!("err:{}", text));
        }

        fn show_qr(&self) {
            self.lines.lock().push("qr".to_string());
        }
    }

    #[test]
    fn test_notifications_forwarded() {
        let screen = Arc::new(Screen::default());
        let ui = UserInterface::new(InstanceId::from("ui-1"), screen.clone());

        ui.show_message("hello");
        assert_eq!(ui.display_status(), "hello");
        ui.show_error("oops");
        ui.show_qr();
        assert_eq!(ui.get("displayStatus"), json!("QR"));

        assert_eq!(
            *screen.lines.lock(),
            vec!["msg:hello", "err:oops", "qr"]
        );
    }

    #[test]
    fn test_attach_stores_instance() {
        let runtime = Runtime::new(EngineConfig::default());
        let ui = UserInterface::attach(&runtime, Arc::new(TracingDisplay));
        assert!(runtime.resolve_as::<UserInterface>(ui.handle()).is_some());
        assert!(!runtime.has_state_machine(ui.handle()));
    }
}
