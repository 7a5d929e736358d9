#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub web_socket_config: WebSocketConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub web_socket_config: WebSocketConfig,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_frame_size: usize,
    pub max_message_size: usize,
    /// Size of the writer's output buffer, in bytes. A message whose
    /// on-wire encoding doesn't fit is fragmented across this boundary
    /// (see the frame writer's fragmentation algorithm).
    pub write_buffer_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_message_size: 64 << 20,
            max_frame_size: 16 << 20,
            write_buffer_size: 4096,
        }
    }
}
