use encoding::{DecoderTrap, EncoderTrap};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    // `§` followed by one colour/format code
    static ref FORMATTING_PATTERN: Regex = Regex::new(r"§[0-9a-fk-orA-FK-OR]?").unwrap();
}

/// 控制台文本编码, 序列化为 WHATWG 名称
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "ascii")]
    ASCII,
    #[default]
    #[serde(rename = "utf-8")]
    UTF8,
    #[serde(rename = "gbk")]
    GBK,
    #[serde(rename = "gb18030")]
    GB18030,
    #[serde(rename = "big5-2003")]
    BIG5_2003,
}

impl Encoding {
    pub fn get(&self) -> encoding::EncodingRef {
        match self {
            Encoding::ASCII => encoding::all::ASCII,
            Encoding::UTF8 => encoding::all::UTF_8,
            Encoding::GBK => encoding::all::GBK,
            Encoding::GB18030 => encoding::all::GB18030,
            Encoding::BIG5_2003 => encoding::all::BIG5_2003,
        }
    }

    /// Invalid sequences become U+FFFD instead of failing the whole body.
    pub fn decode_lossy(&self, raw: &[u8]) -> String {
        self.get()
            .decode(raw, DecoderTrap::Replace)
            .unwrap_or_else(|_| String::from_utf8_lossy(raw).into_owned())
    }

    pub fn encode_lossy(&self, text: &str) -> Vec<u8> {
        self.get()
            .encode(text, EncoderTrap::Replace)
            .unwrap_or_else(|_| text.as_bytes().to_vec())
    }
}

/// 去除 Minecraft 的 `§` 颜色/格式代码
pub fn strip_formatting(text: &str) -> String {
    FORMATTING_PATTERN.replace_all(text, "").into_owned()
}
