use ingest_api::{IngestError, MicroBatch, RawMessage, UserRecord};

/// Decode one bus message into a `UserRecord`.
///
/// The payload must be a UTF-8 JSON object carrying every schema key.
/// Extra keys are ignored.
pub fn parse_message(message: &RawMessage) -> Result<UserRecord, IngestError> {
    let payload = message
        .payload
        .as_deref()
        .ok_or_else(|| IngestError::format_err("empty payload"))?;
    // Через Map, чтобы JSON-массив не прошёл как struct-in-seq.
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(payload)?;
    Ok(serde_json::from_value(serde_json::Value::Object(object))?)
}

/// Lazily parse a micro-batch in arrival order, dropping messages that fail.
pub fn parse_batch(batch: &MicroBatch) -> impl Iterator<Item = UserRecord> + '_ {
    batch.messages.iter().filter_map(move |message| match parse_message(message) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(
                batch_id = batch.id,
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "dropping unparseable message"
            );
            None
        }
    })
}
