//! Cross-context requests answered by the content script.

use crate::gem::GemInfo;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    GetPageInfo,
    InvalidateLogConfigCache,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub url: String,
    pub is_gemini_chat: bool,
    pub is_gem: bool,
    pub gem_info: Option<GemInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    PageInfo(PageInfo),
    Ack { success: bool },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack { success: true }
    }
}
