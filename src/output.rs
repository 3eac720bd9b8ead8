use std::io::{self, Write};
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDateTime};
use regex::Regex;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunSummary};
use crate::catalog::{Catalog, CatalogEntry};

const LINE_WIDTH: usize = 80;

pub const SYNTAX_HELP: &str = "\
# SYNTAX

Select one or more files to download using:

    <category number>:<i>[,<i>,<i>];<category number>:<i>-<i>;...

Indices (<i>) may mix comma-separated values and hyphenated ranges.

Example: '3:4,5; 7:1-10,13' selects items 4 and 5 from category 3, plus
items 1 through 10 and 13 from category 7.

Type 'usage' to see this again, or 'q' to quit.
";

pub const USAGE_EXAMPLE: &str = "\
jgi-query lists and retrieves files from the JGI genome portal. It relies on
curl being installed and on PATH.

# USAGE

$ jgi-query [<jgi_address> | <jgi_abbreviation>] [--xml [<manifest>]] [-f]

Find the organism on https://genome.jgi.doe.gov/ and open its \"Info\" page.
For Nematostella vectensis that page is

    https://genome.jgi.doe.gov/Nemve1/Nemve1.info.html

Either the full address or the abbreviation in it can be passed:

$ jgi-query https://genome.jgi.doe.gov/Nemve1/Nemve1.info.html
$ jgi-query Nemve1

A manifest saved by an earlier run can be reused with --xml to avoid
downloading it again (useful for large top-level groups such as \"fungi\"):

$ jgi-query --xml <manifest>

Without a filename, --xml looks for '<jgi_abbreviation>_jgi_index.xml' in the
output directory (-o), where --keep-temp leaves it, so the organism is required
in that case.
";

/// Printed above the catalog in interactive runs.
pub const SELECTION_PREAMBLE: &str = "\
# Choose files by category number and index, for example:
#
# ====================== [1]: All models, Filtered and Not =====================
# Genes:
#  [1] Nemve1.AllModels.gff.gz--------------------------------------[20 MB|2012]
# Proteins:
#  [2] proteins.Nemve1AllModels.fasta.gz----------------------------[29 MB|2012]
# ================================= [2]: Files =================================
# Additional Files:
#  [1] Nemve1.fasta.gz----------------------------------------------[81 MB|2005]
#
# '1:1,2;2:1' fetches both files from category 1 and the one from category 2.
";

static TIMEZONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s[A-Z]{3}\s").expect("valid timezone regex"));

/// Reduces a portal timestamp such as `Thu Feb 27 16:38:54 PST 2014` to its year.
///
/// Anything that does not parse is shown as given.
pub fn shorten_timestamp(timestamp: &str) -> String {
    let without_zone = TIMEZONE.replace(timestamp.trim(), " ");
    NaiveDateTime::parse_from_str(&without_zone, "%a %b %d %H:%M:%S %Y")
        .map(|parsed| parsed.year().to_string())
        .unwrap_or_else(|_| timestamp.trim().to_string())
}

/// Renders the numbered listing shown before the selection prompt.
pub fn render_catalog(catalog: &Catalog, organism: &str) -> String {
    let mut out = format!("\nQUERY RESULTS FOR '{organism}'\n\n");
    for category in catalog.categories() {
        let title = format!(" [{}]: {} ", category.id, category.name);
        out.push_str(&format!("{title:=^width$}\n", width = LINE_WIDTH));
        for group in &category.groups {
            out.push_str(&format!("{}:\n", group.name));
            for entry in catalog.group_entries(group) {
                out.push_str(&render_entry(entry));
                out.push('\n');
            }
        }
        out.push('\n');
    }
    out
}

fn render_entry(entry: &CatalogEntry) -> String {
    let index = format!(" [{}] ", entry.index);
    let size_date = match entry.timestamp.as_deref() {
        Some(timestamp) => format!("[{}|{}]", entry.size_display, shorten_timestamp(timestamp)),
        None => format!("[{}]", entry.size_display),
    };
    let margin = LINE_WIDTH.saturating_sub(size_date.chars().count() + index.chars().count());
    let mut line = index;
    line.push_str(&entry.filename);
    let used = entry.filename.chars().count();
    if used < margin {
        line.extend(std::iter::repeat_n('-', margin - used));
    }
    line.push_str(&size_date);
    line
}

pub fn print_catalog(catalog: &Catalog, organism: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(render_catalog(catalog, organism).as_bytes())?;
    stdout.flush()
}

#[derive(Debug, Serialize)]
struct CatalogView<'a> {
    organism: &'a str,
    categories: Vec<CategoryView<'a>>,
}

#[derive(Debug, Serialize)]
struct CategoryView<'a> {
    id: u32,
    name: &'a str,
    groups: Vec<GroupView<'a>>,
}

#[derive(Debug, Serialize)]
struct GroupView<'a> {
    name: &'a str,
    files: &'a [CatalogEntry],
}

fn catalog_view<'a>(catalog: &'a Catalog, organism: &'a str) -> CatalogView<'a> {
    CatalogView {
        organism,
        categories: catalog
            .categories()
            .iter()
            .map(|category| CategoryView {
                id: category.id,
                name: &category.name,
                groups: category
                    .groups
                    .iter()
                    .map(|group| GroupView {
                        name: &group.name,
                        files: catalog.group_entries(group),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Machine-readable output; progress events are swallowed so stdout stays JSON.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_catalog(catalog: &Catalog, organism: &str) -> io::Result<()> {
        Self::print_json(&catalog_view(catalog, organism))
    }

    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human progress lines on stderr.
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!(
        "Finished downloading {} of {} files.",
        summary.downloaded.len(),
        summary.requested
    );
    if !summary.failed.is_empty() {
        println!(
            "The following files failed after repeated attempts:\n{}",
            summary.failed.join("\n")
        );
    }
    for skipped in &summary.skipped_decompression {
        println!("Skipped decompression for '{skipped}'");
    }
    for error in &summary.decompression_errors {
        println!("{error}");
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::CategoryMode;
    use crate::manifest::ManifestNode;

    use super::*;

    fn catalog() -> Catalog {
        let root = ManifestNode::container(
            "Nemve1",
            vec![ManifestNode::container(
                "Files",
                vec![ManifestNode::container(
                    "Assembly",
                    vec![ManifestNode::file([
                        ("filename", "Nemve1.fasta.gz"),
                        ("url", "/Nemve1/download/Nemve1.fasta.gz"),
                        ("size", "81 MB"),
                        ("sizeInBytes", "84934656"),
                        ("timestamp", "Thu Feb 27 16:38:54 PST 2014"),
                    ])],
                )],
            )],
        );
        Catalog::extract(&root, &CategoryMode::All)
    }

    #[test]
    fn timestamp_becomes_year() {
        assert_eq!(shorten_timestamp("Thu Feb 27 16:38:54 PST 2014"), "2014");
        assert_eq!(shorten_timestamp("sometime"), "sometime");
    }

    #[test]
    fn lines_are_padded_to_full_width() {
        let rendered = render_catalog(&catalog(), "Nemve1");
        let header = rendered
            .lines()
            .find(|line| line.contains("[1]: Assembly"))
            .unwrap();
        assert_eq!(header.chars().count(), LINE_WIDTH);
        assert!(header.starts_with('='));

        let line = rendered
            .lines()
            .find(|line| line.starts_with(" [1] "))
            .unwrap();
        assert_eq!(line.chars().count(), LINE_WIDTH);
        assert!(line.ends_with("-[81 MB|2014]"));
        assert!(rendered.contains("\nFiles:\n"));
    }

    #[test]
    fn json_view_nests_groups() {
        let catalog = catalog();
        let value = serde_json::to_value(catalog_view(&catalog, "Nemve1")).unwrap();
        assert_eq!(value["categories"][0]["name"], "Assembly");
        assert_eq!(value["categories"][0]["groups"][0]["name"], "Files");
        assert_eq!(
            value["categories"][0]["groups"][0]["files"][0]["filename"],
            "Nemve1.fasta.gz"
        );
    }
}
