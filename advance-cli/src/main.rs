mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use advance_core::hierarchy::{self, InputShape};
use advance_core::history::ParsedHistory;
use advance_core::numbering::{self, GrammarBranch};
use advance_core::progress::{self, CompletionStats};
use advance_core::{
    apply_migration, completed_numbers, get_config_path, history, reconcile, ChecklistKind,
    ChecklistVersion, Confidence, HierarchyMode, MappingSummary, NodeId, ProgressFile,
    RequirementMapping, RequirementTree, Settings, Storage,
};

use crate::cli::{flag_override, Cli, Command};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => get_config_path()?,
    };
    let settings = Settings::load_or_create(&config_path)?;

    match &cli.command {
        Command::Number { raw } => {
            show_numbers(raw);
        }
        Command::Tree {
            checklist,
            progress,
            collapse_completed,
            no_collapse_completed,
        } => {
            let progress_path = progress_path(progress, &settings);
            let collapse = flag_override(
                *collapse_completed,
                *no_collapse_completed,
                settings.collapse_completed,
            );
            show_tree(checklist, progress_path.as_deref(), collapse)?;
        }
        Command::Reconcile {
            from,
            to,
            progress,
            threshold,
            format,
        } => {
            let settings = apply_threshold(settings, *threshold)?;
            let progress_path = progress_path(progress, &settings)
                .context("No progress file given and none set in the config")?;
            handle_reconcile(from, to, &progress_path, &settings, format)?;
        }
        Command::Migrate {
            from,
            to,
            progress,
            threshold,
            yes,
        } => {
            let settings = apply_threshold(settings, *threshold)?;
            let progress_path = progress_path(progress, &settings)
                .context("No progress file given and none set in the config")?;
            handle_migrate(from, to, &progress_path, &settings, *yes)?;
        }
        Command::Import {
            file,
            format,
            checklist,
        } => {
            handle_import(file, format, checklist.as_deref())?;
        }
    }

    Ok(())
}

fn progress_path(flag: &Option<PathBuf>, settings: &Settings) -> Option<PathBuf> {
    flag.clone().or_else(|| settings.progress_file.clone())
}

fn apply_threshold(settings: Settings, threshold: Option<f64>) -> Result<Settings> {
    match threshold {
        Some(t) => Ok(settings.with_threshold(t)?),
        None => Ok(settings),
    }
}

/// Reads a progress file without creating it
fn read_progress(path: &Path) -> Result<ProgressFile> {
    let storage = Storage::new(path);
    if !storage.exists() {
        log::info!("progress file {:?} does not exist yet", path);
        return Ok(ProgressFile::default());
    }
    storage.load::<ProgressFile>()
}

/// Loads two checklist versions in parallel
fn load_versions(from: &Path, to: &Path) -> Result<(ChecklistVersion, ChecklistVersion)> {
    let (source, target) = rayon::join(
        || Storage::new(from).load_checklist(),
        || Storage::new(to).load_checklist(),
    );
    Ok((source?, target?))
}

fn show_numbers(raw: &[String]) {
    println!(
        "{:<16} | {:<6} | {:<16} | {:<5} | {:<13}",
        "Raw", "Group", "Sub-parts", "Depth", "Branch"
    );
    println!("{}", "-".repeat(68));

    let mut parsed: Vec<_> = raw.iter().map(|r| numbering::parse(r)).collect();
    parsed.sort_by(numbering::compare);

    for number in &parsed {
        let branch = match number.branch() {
            GrammarBranch::Standard => "standard".green(),
            GrammarBranch::Parenthetical => "parenthetical".blue(),
            GrammarBranch::Fallback => "fallback".yellow(),
        };
        let sub_parts = if number.sub_parts().is_empty() {
            "-".to_string()
        } else {
            number.sub_parts().join(" ")
        };
        println!(
            "{:<16} | {:<6} | {:<16} | {:<5} | {:<13}",
            number.raw(),
            number.group(),
            sub_parts,
            number.depth(),
            branch
        );
    }
}

fn show_tree(checklist_path: &Path, progress_path: Option<&Path>, collapse: bool) -> Result<()> {
    let checklist = Storage::new(checklist_path).load_checklist()?;
    let progress = match progress_path {
        Some(path) => read_progress(path)?,
        None => ProgressFile::default(),
    };

    println!(
        "{} {} ({})",
        checklist.name.bold(),
        checklist.version,
        checklist.kind
    );

    let shape = InputShape::for_mode(checklist.hierarchy, checklist.requirements);
    let tree = hierarchy::build(shape, &progress.records);
    if tree.is_empty() {
        println!("{}", "No requirements found.".yellow());
        return Ok(());
    }

    let stats = progress::stats_by_node(&tree);
    let collapsed = progress::default_collapsed(&tree, collapse);

    for root in tree.roots() {
        print_node(&tree, *root, &stats, &collapsed);
    }

    println!("{}", "-".repeat(60));
    let total = progress::forest_stats(&tree);
    let line = format!("Overall: {}", total);
    if total.is_fully_complete() {
        println!("{}", line.green());
    } else {
        println!("{}", line);
    }

    Ok(())
}

fn print_node(
    tree: &RequirementTree,
    root: NodeId,
    stats: &[CompletionStats],
    collapsed: &BTreeSet<Uuid>,
) {
    let mut stack = vec![(root, 0usize)];

    while let Some((id, indent)) = stack.pop() {
        let node = tree.node(id);
        let mark = if node.is_complete() {
            "[x]".green()
        } else {
            "[ ]".normal()
        };
        let folded = collapsed.contains(&node.requirement.id);

        let mut line = format!(
            "{}{} {:<8} {}",
            "  ".repeat(indent),
            mark,
            node.requirement.requirement_number,
            node.requirement.description
        );
        if !node.children.is_empty() {
            let s = stats[id.0];
            line.push_str(&format!("  ({}/{})", s.completed, s.total));
            if let Some(satisfied) = progress::alternatives_satisfied(tree, id) {
                let required = node.requirement.required_count.unwrap_or_default();
                let label = format!(" [choose {}]", required);
                line.push_str(&if satisfied {
                    label.green().to_string()
                } else {
                    label.yellow().to_string()
                });
            }
            if folded {
                line.push_str(" ...");
            }
        }
        println!("{}", line);

        if !folded {
            stack.extend(node.children.iter().rev().map(|child| (*child, indent + 1)));
        }
    }
}

fn reconcile_files(
    from: &Path,
    to: &Path,
    progress_path: &Path,
    settings: &Settings,
) -> Result<(ChecklistVersion, ChecklistVersion, ProgressFile, Vec<RequirementMapping>)> {
    let (source, target) = load_versions(from, to)?;
    let progress = read_progress(progress_path)?;

    let done = completed_numbers(&source.requirements, &progress.records);
    let mappings = reconcile(
        &source.requirements,
        &target.requirements,
        &done,
        &settings.reconcile_options(),
    );
    log::debug!(
        "reconciled {} completed requirements from {} {} to {}",
        mappings.len(),
        source.name,
        source.version,
        target.version
    );
    Ok((source, target, progress, mappings))
}

fn print_mappings(mappings: &[RequirementMapping]) {
    if mappings.is_empty() {
        println!("{}", "No completed requirements to map.".yellow());
        return;
    }

    println!(
        "{:<10} | {:<10} | {:<8} | {:<40}",
        "From", "To", "Match", "Description"
    );
    println!("{}", "-".repeat(80));

    for mapping in mappings {
        let confidence = match mapping.confidence {
            Confidence::Exact => "exact".green(),
            Confidence::Likely => "likely".yellow(),
            Confidence::Manual => "manual".blue(),
            Confidence::None => "none".red(),
        };
        println!(
            "{:<10} | {:<10} | {:<8} | {:<40}",
            mapping.source_number,
            mapping.target_number.as_deref().unwrap_or("-"),
            confidence,
            mapping.source_description
        );
        if mapping.confidence == Confidence::Likely {
            if let Some(target) = &mapping.target_description {
                println!("{:<10} | {:<10} | {:<8} | {}", "", "", "", target.dimmed());
            }
        }
    }

    let summary = MappingSummary::from_mappings(mappings);
    println!("{}", "-".repeat(80));
    println!(
        "{} exact, {} likely, {} manual, {} unmatched",
        summary.exact, summary.likely, summary.manual, summary.none
    );
}

fn handle_reconcile(
    from: &Path,
    to: &Path,
    progress_path: &Path,
    settings: &Settings,
    format: &str,
) -> Result<()> {
    let (_, _, _, mappings) = reconcile_files(from, to, progress_path, settings)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&mappings)?),
        "table" => print_mappings(&mappings),
        other => bail!("Unsupported format: {}", other),
    }
    Ok(())
}

fn handle_migrate(
    from: &Path,
    to: &Path,
    progress_path: &Path,
    settings: &Settings,
    skip_confirm: bool,
) -> Result<()> {
    let (source, target, _, mappings) = reconcile_files(from, to, progress_path, settings)?;

    println!(
        "{}",
        format!(
            "Migrating {} from {} to {}:",
            source.name, source.version, target.version
        )
        .yellow()
    );
    print_mappings(&mappings);

    if mappings.is_empty() {
        return Ok(());
    }

    if !skip_confirm {
        let confirm = inquire::Confirm::new("Rewrite the progress file with these mappings?")
            .with_default(false)
            .prompt()?;

        if !confirm {
            println!("{}", "Migration cancelled.".yellow());
            return Ok(());
        }
    }

    // Reload under the lock so progress written since the review is kept
    let mut outcome = None;
    Storage::new(progress_path).update_atomically(|file: &mut ProgressFile| {
        outcome = Some(apply_migration(
            &mut file.records,
            &source.requirements,
            mappings,
        ));
    })?;
    let outcome = outcome.unwrap_or_default();

    for number in &outcome.unmapped {
        println!(
            "{}",
            format!("Requirement {} has no counterpart; its progress is dropped", number).red()
        );
    }
    println!(
        "{}",
        format!(
            "Migrated {} requirement(s) into {:?}",
            outcome.migrated.len(),
            progress_path
        )
        .green()
    );
    Ok(())
}

/// One imported rank or badge, ready to be saved as checklist and progress files
#[derive(Serialize)]
struct ImportedChecklist {
    checklist: ChecklistVersion,
    progress: ProgressFile,
}

fn imported_checklist(parsed: &ParsedHistory, name: &str) -> Option<ImportedChecklist> {
    let (kind, label, version, (requirements, records)) =
        if let Some(records) = parsed.rank_records(name) {
            let rank = parsed.rank(name)?;
            (ChecklistKind::Rank, rank.rank.clone(), None, records)
        } else {
            let badge = parsed.partial_badge(name)?;
            let records = parsed.badge_records(name)?;
            (
                ChecklistKind::MeritBadge,
                badge.name.clone(),
                badge.version.clone(),
                records,
            )
        };

    let scout = if parsed.scout_info.name.is_empty() {
        None
    } else {
        Some(parsed.scout_info.clone())
    };

    Some(ImportedChecklist {
        checklist: ChecklistVersion {
            name: label,
            kind,
            version: version.unwrap_or_else(|| "imported".to_string()),
            effective_date: None,
            hierarchy: HierarchyMode::Legacy,
            requirements,
        },
        progress: ProgressFile {
            scout,
            records,
        },
    })
}

fn print_document<T: Serialize>(value: &T, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(value)?),
        "yaml" => print!("{}", serde_yaml::to_string(value)?),
        other => bail!("Unsupported format: {}", other),
    }
    Ok(())
}

fn handle_import(file: &Path, format: &str, checklist: Option<&str>) -> Result<()> {
    let document = fs::read_to_string(file)
        .with_context(|| format!("Failed to read history export: {:?}", file))?;

    let parsed = history::parse(&document);

    match checklist {
        Some(name) => {
            let imported = imported_checklist(&parsed, name).with_context(|| {
                format!("No rank or partial merit badge named '{}' in {:?}", name, file)
            })?;
            print_document(&imported, format)?;
        }
        None => print_document(&parsed, format)?,
    }

    if parsed.has_errors() {
        eprintln!(
            "{}",
            format!("{} problem(s) found while parsing:", parsed.errors.len()).yellow()
        );
        for error in &parsed.errors {
            eprintln!("  {}", error.yellow());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn tree_flags(args: &[&str]) -> (bool, bool) {
        let mut argv = vec!["advance", "tree", "camping.yaml"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Tree {
                collapse_completed,
                no_collapse_completed,
                ..
            } => (collapse_completed, no_collapse_completed),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_collapse_flags_override_config() {
        let (on, off) = tree_flags(&[]);
        assert!(flag_override(on, off, true));
        assert!(!flag_override(on, off, false));

        let (on, off) = tree_flags(&["--no-collapse-completed"]);
        assert!(!flag_override(on, off, true));

        let (on, off) = tree_flags(&["--collapse-completed"]);
        assert!(flag_override(on, off, false));

        let (on, off) = tree_flags(&["--no-collapse-completed", "--collapse-completed"]);
        assert!(flag_override(on, off, false));
    }

    #[test]
    fn test_imported_checklist_for_rank_and_badge() {
        let parsed = history::parse(
            "\
Name: Alex Rivera
Tenderfoot
1a, Pitch a tent, 01/15/2023
1b, Cook a meal, ________
Partial Merit Badges
Cooking, 2022
    1a, Explain food safety, 02/01/2023
",
        );

        let rank = imported_checklist(&parsed, "tenderfoot").unwrap();
        assert_eq!(rank.checklist.name, "Tenderfoot");
        assert_eq!(rank.checklist.kind, ChecklistKind::Rank);
        assert_eq!(rank.checklist.requirements.len(), 2);
        assert_eq!(rank.progress.records.len(), 2);
        assert_eq!(rank.progress.scout.as_ref().unwrap().name, "Alex Rivera");

        let badge = imported_checklist(&parsed, "Cooking").unwrap();
        assert_eq!(badge.checklist.kind, ChecklistKind::MeritBadge);
        assert_eq!(badge.checklist.version, "2022");
        assert_eq!(
            badge.progress.records[0].requirement_id,
            badge.checklist.requirements[0].id
        );

        assert!(imported_checklist(&parsed, "Archery").is_none());
    }
}
