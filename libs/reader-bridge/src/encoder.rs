use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Local, TimeZone};
use serde::Serialize;

use reader_api::Message;

use crate::EncodeError;

const PUBLISH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f%z";

/// JSON-объект, отправляемый клиенту на каждое сообщение.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage<'a> {
    message_id: String,
    payload: String,
    properties: &'a HashMap<String, String>,
    publish_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
}

/// Message → text frame. Чистая функция без состояния: ошибка здесь
/// означает, что сообщение непредставимо, а не сбой transport'а.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageEncoder;

impl MessageEncoder {
    pub fn encode(&self, msg: &Message) -> Result<String, EncodeError> {
        self.encode_in(msg, &Local)
    }

    pub(crate) fn encode_in<Tz>(&self, msg: &Message, zone: &Tz) -> Result<String, EncodeError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let wire = WireMessage {
            message_id: msg.id.to_base64(),
            payload: STANDARD.encode(&msg.payload),
            properties: &msg.properties,
            publish_time: format_publish_time(msg.publish_time_ms, zone)?,
            key: msg.key.as_deref(),
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

fn format_publish_time<Tz>(ms: i64, zone: &Tz) -> Result<String, EncodeError>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let ts = zone
        .timestamp_millis_opt(ms)
        .single()
        .ok_or(EncodeError::PublishTime(ms))?;
    Ok(ts.format(PUBLISH_TIME_FORMAT).to_string())
}
