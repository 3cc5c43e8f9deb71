use livekit::prelude::RoomOptions;

/// Connection and publishing options shared by the connect and conference
/// view-models.
///
/// The defaults turn off the SDK's automatic behaviors so that the
/// conference view-model decides what to subscribe to and every track is
/// sent at a single quality.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub auto_subscribe: bool,
    pub adaptive_stream: bool,
    pub dynacast: bool,
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_fps: u32,
    pub simulcast: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_subscribe: false,
            adaptive_stream: false,
            dynacast: false,
            camera_width: 1920,
            camera_height: 1080,
            camera_fps: 30,
            simulcast: false,
        }
    }
}

impl SessionOptions {
    pub fn room_options(&self) -> RoomOptions {
        let mut options = RoomOptions::default();
        options.auto_subscribe = self.auto_subscribe;
        options.adaptive_stream = self.adaptive_stream;
        options.dynacast = self.dynacast;
        options
    }
}
