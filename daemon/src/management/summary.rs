use crate::management::inst_config::NameList;
use crate::management::instance::McServer;
use mcfleet_protocol::management::instance::Connectivity;

pub const EMPTY_SUMMARY: &str = "No visible servers found.";

fn names_or_none(names: &NameList) -> String {
    if names.is_empty() {
        return "_None_".to_owned();
    }
    names
        .iter()
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn connectivity_label(connectivity: Connectivity) -> Option<&'static str> {
    match connectivity {
        Connectivity::Unconfigured => None,
        Connectivity::NoRcon => Some("未開放 RCON"),
        Connectivity::Offline => Some("離線"),
        Connectivity::Online => Some("線上"),
    }
}

/// `host:port` as players should type it.
pub fn address(server: &McServer, domain_base: &str) -> String {
    let meta = server.meta();
    let host = meta
        .domain
        .as_deref()
        .or(meta.ip.as_deref())
        .unwrap_or(domain_base);
    let port = meta
        .port
        .as_deref()
        .or_else(|| {
            server
                .files()
                .properties
                .get("server-port")
                .map(String::as_str)
                .filter(|p| !p.is_empty())
        })
        .unwrap_or("????");
    format!("{}:{}", host, port)
}

pub fn render_section(server: &McServer, domain_base: &str) -> String {
    let meta = server.meta();
    let files = server.files();
    let mut lines = vec![
        format!(
            "### {}（{} {}）",
            meta.name.as_deref().unwrap_or(server.id()),
            meta.version.as_deref().unwrap_or("unknown"),
            meta.server_type.as_deref().unwrap_or("unknown"),
        ),
        format!("- ID: `{}`", server.id()),
        format!("- IP: `{}`", address(server, domain_base)),
        format!("- OPs: {}", names_or_none(&files.ops)),
        format!("- 白名單: {}", names_or_none(&files.whitelist)),
        format!(
            "- 開機自動啟動: {}",
            if files.autostart { "是" } else { "否" }
        ),
    ];

    if let Some(label) = connectivity_label(server.connectivity()) {
        lines.push(format!("- 狀態: {}", label));
    }
    if let Some(players) = server.players() {
        let online = if players.online.is_empty() {
            String::new()
        } else {
            format!("（{}）", names_or_none(&players.online))
        };
        lines.push(format!("- 玩家: {}/{}{}", players.current, players.max, online));
    }
    if let Some(tps) = server.tps() {
        let [one, five, fifteen] = tps.samples();
        lines.push(format!("- TPS: {:.2} / {:.2} / {:.2}", one, five, fifteen));
    }

    lines.join("\n")
}

pub fn render_summary(title: &str, notice: &str, sections: &[String]) -> String {
    if sections.is_empty() {
        return EMPTY_SUMMARY.to_owned();
    }
    format!("# {}\n{}\n\n{}", title, notice, sections.join("\n\n"))
}
