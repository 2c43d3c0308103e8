use crate::engine::EngineHandle;
use zbus::interface;

pub const BUS_NAME: &str = "org.freedesktop.Likeness1";
pub const OBJECT_PATH: &str = "/org/freedesktop/Likeness1";

/// D-Bus interface for the Likeness verification daemon.
///
/// Bus name: org.freedesktop.Likeness1
/// Object path: /org/freedesktop/Likeness1
pub struct LikenessService {
    engine: EngineHandle,
}

impl LikenessService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.freedesktop.Likeness1")]
impl LikenessService {
    /// Arm the session for one attempt on the next frame.
    ///
    /// Returns `false` if it was already armed; triggers are not queued.
    async fn arm(&self) -> bool {
        let armed = self.engine.arm();
        tracing::info!(newly_armed = armed, "arm requested");
        armed
    }

    /// Return the session status as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        serde_json::to_string(&self.engine.status()).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }
}
