use dual::PlayerId;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    PlayerJoined { player_id: PlayerId, entity_id: u64 },
    PlayerLeft { player_id: PlayerId },
    Error { message: String },
}
