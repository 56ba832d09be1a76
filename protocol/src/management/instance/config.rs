use serde::{Deserialize, Serialize};

/// 启动脚本中 `# key: value` 注释声明的实例元数据
///
/// Values are kept as written; nothing here is validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchMeta {
    #[serde(rename = "server-name")]
    pub name: Option<String>,
    #[serde(rename = "server-version")]
    pub version: Option<String>,
    #[serde(rename = "server-type")]
    pub server_type: Option<String>,
    #[serde(rename = "server-port")]
    pub port: Option<String>,
    #[serde(rename = "server-ip")]
    pub ip: Option<String>,
    #[serde(rename = "server-domain")]
    pub domain: Option<String>,
    #[serde(rename = "visible-to-bot")]
    pub visible: bool,
}

impl LaunchMeta {
    /// Case-insensitive match of the declared server type against `family`.
    pub fn is_type_in<S: AsRef<str>>(&self, family: &[S]) -> bool {
        self.server_type.as_deref().is_some_and(|declared| {
            family
                .iter()
                .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(declared))
        })
    }
}
