use teletrim_telegram::{ClientError, MessagePreview, MessengerClient, PeerRef};

/// The last `limit` messages with `peer`, oldest first.
pub async fn preview<C: MessengerClient + ?Sized>(
    client: &C,
    peer: &PeerRef,
    limit: usize,
) -> Result<Vec<MessagePreview>, ClientError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut messages = client.recent_messages(peer, limit).await?;
    messages.reverse();
    Ok(messages)
}
