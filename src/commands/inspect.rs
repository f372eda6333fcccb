//! Offline command handlers: everything here works on descriptor files.

use super::{resolve_profile, CommandResult};
use anyhow::Context;
use iichid::{load_bytes, parse_hex, ProfileRegistry};
use iichid_map::usages::page_name;
use iichid_map::{HidMap, ReportDescriptor, Target};
use iichid_transport::{hex_dump, ReportKind};
use std::path::Path;

fn load_rdesc(path: &Path) -> anyhow::Result<(Vec<u8>, ReportDescriptor)> {
    let bytes = load_bytes(path).with_context(|| format!("reading {}", path.display()))?;
    let rdesc = ReportDescriptor::parse(&bytes);
    Ok((bytes, rdesc))
}

/// Dump fields and report sizes
pub fn descriptor(path: &Path) -> CommandResult {
    let (bytes, rdesc) = load_rdesc(path)?;

    println!("Report descriptor: {} bytes", bytes.len());
    println!("  Report ids: {}", if rdesc.uses_report_ids() { "yes" } else { "no" });
    for app in rdesc.applications() {
        println!("  Application: {} ({})", app, page_name(app.page));
    }
    println!();

    println!(
        "{:<8} {:>3} {:>6} {:>4} {:>5} {:<5} {:>11}  Usages",
        "Kind", "ID", "Offset", "Size", "Count", "Type", "Logical"
    );
    for field in rdesc.fields() {
        let kind = match field.kind {
            ReportKind::Input => "input",
            ReportKind::Output => "output",
            ReportKind::Feature => "feature",
        };
        let ty = if field.is_constant() {
            "const"
        } else if field.is_variable() {
            if field.is_relative() {
                "rel"
            } else {
                "abs"
            }
        } else {
            "array"
        };
        let mut usages: Vec<String> = field.usages.iter().map(|u| u.to_string()).collect();
        if let Some(range) = field.usage_range {
            usages.push(format!("{}..{}", range.min, range.max));
        }
        println!(
            "{:<8} {:>3} {:>6} {:>4} {:>5} {:<5} {:>11}  {}",
            kind,
            field.report_id,
            field.bit_offset,
            field.bit_size,
            field.count,
            ty,
            format!("{}..{}", field.logical_min, field.logical_max),
            usages.join(" ")
        );
    }
    println!();

    for (kind, name) in [
        (ReportKind::Input, "Input"),
        (ReportKind::Output, "Output"),
        (ReportKind::Feature, "Feature"),
    ] {
        let size = rdesc.report_size(kind);
        if size > 0 {
            println!("{name} report size: {size} bytes");
        }
    }
    Ok(())
}

/// Print the capability bitset of a profile against a descriptor
pub fn probe(registry: &ProfileRegistry, path: &Path, profile: Option<&str>) -> CommandResult {
    let (_, rdesc) = load_rdesc(path)?;
    let profile = resolve_profile(registry, profile, &rdesc)?;
    let table = profile.table();
    let caps = HidMap::probe(&rdesc, &table);

    println!("Profile: {} ({})", profile.name(), profile.description());
    println!("Capabilities: {} ({} of {})", caps, caps.count_all(), table.len());
    for (index, entry) in table.iter().enumerate() {
        let usage = match entry.usage_range() {
            Some(range) if range.len() > 1 => format!("{}..{}", range.min, range.max),
            Some(range) => range.min.to_string(),
            None => "completion".to_string(),
        };
        let target = match &entry.target {
            Target::Event { ty, code } => format!("{} 0x{:03x}", ty.name(), code),
            Target::Callback(_) => "callback".to_string(),
        };
        println!(
            "  [{}] {:<20} {:<20} {:<16}{}",
            if caps.test(index) { "x" } else { " " },
            entry.name,
            usage,
            target,
            if entry.required { " required" } else { "" }
        );
    }
    Ok(())
}

/// Decode hex reports through a profile and print the events
pub fn decode(
    registry: &ProfileRegistry,
    path: &Path,
    profile: Option<&str>,
    reports: &[String],
) -> CommandResult {
    let (_, rdesc) = load_rdesc(path)?;
    let profile = resolve_profile(registry, profile, &rdesc)?;
    let mut map = HidMap::attach(&rdesc, profile.table())
        .with_context(|| format!("attaching profile {}", profile.name()))?;

    let declaration = map.declaration();
    let declared: Vec<String> = declaration
        .events()
        .map(|(ty, code)| format!("{}:0x{:03x}", ty.name(), code))
        .collect();
    println!("Profile: {}", profile.name());
    println!("Declared: {}", declared.join(" "));
    for prop in declaration.properties() {
        println!("Property: {:?}", prop);
    }

    for text in reports {
        let report = parse_hex(text).with_context(|| format!("parsing report '{text}'"))?;
        println!();
        println!("Report: {}", hex_dump(&report));
        let mut events = Vec::new();
        map.decode(&report, &mut events);
        for event in events {
            println!("  {event}");
        }
    }

    map.detach();
    Ok(())
}

/// List registered profiles
pub fn profiles(registry: &ProfileRegistry) {
    println!("{:<20} {:<24} Applications", "Name", "Description");
    for profile in registry.all_profiles() {
        let apps: Vec<String> = profile
            .applications()
            .iter()
            .map(|u| u.to_string())
            .collect();
        println!(
            "{:<20} {:<24} {}",
            profile.name(),
            profile.description(),
            apps.join(" ")
        );
    }
}
