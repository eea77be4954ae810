use core::fmt::Write;

use super::super::config::{DEFAULT_API_URL, HOSTNAME};
use super::super::health::counters::HealthCounters;
use super::super::health::snapshot::HealthSnapshot;
use super::super::types::DeviceConfig;

pub(super) const PAGE_BUF: usize = 2048;

const PAGE_STYLE: &str = "body{font-family:sans-serif;max-width:560px;margin:2rem auto;\
padding:0 1rem;color:#222}h1{margin:0 0 .5rem}.card{border:1px solid #ccc;\
border-radius:8px;padding:1rem;margin-bottom:1rem}label{display:block;margin:.5rem 0 .2rem}\
input{width:100%;padding:.4rem;box-sizing:border-box}button{padding:.5rem .9rem;margin-top:.8rem}\
.ok{color:#106010}.err{color:#a00000}td{padding:.15rem .6rem .15rem 0}";

/// Station dashboard: live state, counters, and the escape hatches.
pub(super) fn render_dashboard(
    out: &mut heapless::String<PAGE_BUF>,
    snapshot: &HealthSnapshot,
    counters: &HealthCounters,
    config: &DeviceConfig,
) {
    let _ = write!(
        out,
        "<!doctype html><html><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{host}</title><style>{style}</style></head><body>\
<h1>{host}</h1><div class=\"card\"><table>\
<tr><td>Network</td><td>{name}</td></tr>\
<tr><td>Link</td><td class=\"{link_class}\">{link}</td></tr>\
<tr><td>Signal</td><td>{dbm} dBm</td></tr>\
<tr><td>Internet</td><td class=\"{inet_class}\">{inet}</td></tr>\
<tr><td>API</td><td class=\"{api_class}\">{api}</td></tr>\
<tr><td>API URL</td><td>{url}</td></tr>\
</table></div><div class=\"card\"><table>\
<tr><td>Boots</td><td>{boots}</td></tr>\
<tr><td>Internet-up cycles</td><td>{up}</td></tr>\
<tr><td>API-success cycles</td><td>{ok}</td></tr>\
</table></div><div class=\"card\">\
<a href=\"/configmode\">Configuration mode</a> &middot; \
<a href=\"/reboot\">Reboot</a> &middot; \
<a href=\"/reset\">Factory reset</a></div></body></html>",
        host = HOSTNAME,
        style = PAGE_STYLE,
        name = config.network_name(),
        link_class = if snapshot.link_up { "ok" } else { "err" },
        link = if snapshot.link_up { "up" } else { "down" },
        dbm = snapshot.signal_dbm,
        inet_class = if snapshot.internet_reachable { "ok" } else { "err" },
        inet = if snapshot.internet_reachable {
            "reachable"
        } else {
            "unreachable"
        },
        api_class = if snapshot.api_reachable { "ok" } else { "err" },
        api = if snapshot.api_reachable {
            "reachable"
        } else {
            "unreachable"
        },
        url = config.api_url(),
        boots = counters.boot_count,
        up = counters.internet_up_count,
        ok = counters.api_success_count,
    );
}

/// Portal configuration form, prefilled with the current values. The secret
/// is never echoed back.
pub(super) fn render_config_form(out: &mut heapless::String<PAGE_BUF>, config: &DeviceConfig) {
    let api_url = if config.api_url().is_empty() {
        DEFAULT_API_URL
    } else {
        config.api_url()
    };
    let _ = write!(
        out,
        "<!doctype html><html><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>{host} setup</title><style>{style}</style></head><body>\
<h1>{host} setup</h1><div class=\"card\"><form method=\"POST\" action=\"/save\">\
<label>Network name</label><input name=\"name\" type=\"text\" value=\"{name}\">\
<label>Network secret</label><input name=\"secret\" type=\"password\">\
<label>API URL</label><input name=\"api\" type=\"text\" value=\"{url}\">\
<button type=\"submit\">Save and restart</button></form></div>\
<div class=\"card\"><a href=\"/reset\">Factory reset</a> &middot; \
<a href=\"/debug\">Diagnostics</a></div></body></html>",
        host = HOSTNAME,
        style = PAGE_STYLE,
        name = config.network_name(),
        url = api_url,
    );
}

pub(super) fn render_saved_page(out: &mut heapless::String<PAGE_BUF>) {
    let _ = write!(
        out,
        "<!doctype html><html><head><style>{style}</style></head><body>\
<h1>Saved</h1><p>Settings stored. The device is restarting and will join the \
configured network.</p></body></html>",
        style = PAGE_STYLE,
    );
}

/// Plain-text diagnostics, the serial log's little sibling.
pub(super) fn render_debug(
    out: &mut heapless::String<PAGE_BUF>,
    snapshot: &HealthSnapshot,
    counters: &HealthCounters,
    config: &DeviceConfig,
) {
    let _ = write!(
        out,
        "mode={}\nlink_up={}\nsignal_dbm={}\ninternet_reachable={}\napi_reachable={}\n\
boot_count={}\ninternet_up_count={}\napi_success_count={}\nnetwork_name={}\napi_url={}\n",
        snapshot.mode.as_str(),
        snapshot.link_up,
        snapshot.signal_dbm,
        snapshot.internet_reachable,
        snapshot.api_reachable,
        counters.boot_count,
        counters.internet_up_count,
        counters.api_success_count,
        config.network_name(),
        config.api_url(),
    );
}
