//! Minimal SSE body parsing for assertions

use serde_json::Value;

/// One `event:`/`data:` frame
#[derive(Debug)]
pub struct Frame {
    pub event: Option<String>,
    pub data: String,
}

impl Frame {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.data).expect("frame data is JSON")
    }
}

/// Split a complete SSE body into frames, skipping comment lines
pub fn parse_frames(body: &str) -> Vec<Frame> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = Vec::new();

            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = Some(name.to_owned());
                } else if let Some(payload) = line.strip_prefix("data: ") {
                    data.push(payload);
                }
            }

            (event.is_some() || !data.is_empty()).then(|| Frame {
                event,
                data: data.join("\n"),
            })
        })
        .collect()
}

/// Names of the named events, in order
pub fn event_names(frames: &[Frame]) -> Vec<&str> {
    frames.iter().filter_map(|f| f.event.as_deref()).collect()
}
