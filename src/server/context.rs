/// Per-socket identity established by the connect handshake. The connection
/// id changes on every reconnect; the player id never does.
#[derive(Debug)]
pub struct ConnectionContext {
    connection_id: u64,
    player_id: String,
    player_name: String,
}

impl ConnectionContext {
    pub fn new(connection_id: u64, player_id: String, player_name: String) -> Self {
        Self {
            connection_id,
            player_id,
            player_name,
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }
}
