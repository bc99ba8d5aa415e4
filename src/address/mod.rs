//! Recipient lists for replies, derived from To/From/Cc.
use std::collections::HashSet;

use mailparse::{addrparse_header, MailAddr, MailHeader, MailHeaderMap, SingleInfo};
use serde::Serialize;
use tracing::debug;

/// Header fields scanned, in priority order.
pub const RECIPIENT_FIELDS: [&str; 3] = ["To", "From", "Cc"];

/// Parallel lists: `addresses[i]` is the bare form of `named[i]`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Recipients {
    pub addresses: Vec<String>,
    pub named: Vec<String>,
}

impl Recipients {
    fn push(&mut self, seen: &mut HashSet<String>, info: &SingleInfo) {
        if seen.insert(info.addr.clone()) {
            self.addresses.push(info.addr.clone());
            self.named.push(named_form(info));
        }
    }
}

/// `"Display Name" <addr>`, or `<addr>` without a name.
pub fn named_form(info: &SingleInfo) -> String {
    match info.display_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => {
            format!("\"{}\" <{}>", name.replace('\\', "\\\\").replace('"', "\\\""), info.addr)
        }
        _ => format!("<{}>", info.addr),
    }
}

/// Collects deduplicated recipients, keeping first-occurrence order.
///
/// When `owner` is given, that address is left out unless it also appears in
/// `From`, so a message the owner sent still lists them.
pub fn extract_recipients(headers: &[MailHeader], owner: Option<&str>) -> Recipients {
    let fields: Vec<(&str, Vec<SingleInfo>)> = RECIPIENT_FIELDS
        .iter()
        .map(|&field| (field, field_addresses(headers, field)))
        .collect();

    let owner_is_sender = owner.is_some_and(|owner| {
        fields
            .iter()
            .filter(|(field, _)| *field == "From")
            .flat_map(|(_, addrs)| addrs)
            .any(|info| info.addr.eq_ignore_ascii_case(owner))
    });

    let mut recipients = Recipients::default();
    let mut seen = HashSet::new();
    for (_, addrs) in &fields {
        for info in addrs {
            let is_owner = owner.is_some_and(|owner| info.addr.eq_ignore_ascii_case(owner));
            if is_owner && !owner_is_sender {
                continue;
            }
            recipients.push(&mut seen, info);
        }
    }
    recipients
}

fn field_addresses(headers: &[MailHeader], field: &str) -> Vec<SingleInfo> {
    let mut out = Vec::new();
    for header in headers.get_all_headers(field) {
        match addrparse_header(header) {
            Ok(list) => {
                for addr in list.iter() {
                    match addr {
                        MailAddr::Single(info) => out.push(info.clone()),
                        MailAddr::Group(group) => out.extend(group.addrs.iter().cloned()),
                    }
                }
            }
            Err(e) => debug!(field, error = %e, "skipping malformed address header"),
        }
    }
    out
}
