//! Command-output parsers.
//!
//! All raw text from the version-control tool is turned into typed values here;
//! nothing past this module looks at command output lines.

use std::sync::LazyLock;

use regex::Regex;

/// `//depot/Path/File.uasset#3 - edit default change (text)`
///
/// Anchored on `#rev`: names may contain ` - `, and a literal `#` is escaped as `%23`.
static OPENED_LINE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(//[^#]+)#\d+\s+-\s+(\S+)").expect("valid, static regex"));

/// `Change 12345 on 2025/08/10 by user@client 'desc...'`
static CHANGE_LINE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^Change\s+(\d+)\s+on\s+.+? by .+? '(.+)'").expect("valid, static regex"));

/// `<depot> <client> <local...>`; the local path may contain spaces.
static WHERE_LINE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(\S+)\s+(\S+)\s+(.+)$").expect("valid, static regex"));

/// `P4PORT=ssl:perforce:1666 (set)`
static SET_LINE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^(\w+)\s*=\s*(.*?)(?:\s+\(.*)?\s*$").expect("valid, static regex"));

/// What an open file is open for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenAction {
        Edit,
        Add,
        MoveAdd,
        /// delete, move/delete, branch, integrate, ...
        Other(String),
}

impl OpenAction {
        pub fn from_keyword(keyword: &str) -> Self {
                match keyword.to_lowercase().as_str() {
                        "edit" => OpenAction::Edit,
                        "add" => OpenAction::Add,
                        "move/add" => OpenAction::MoveAdd,
                        other => OpenAction::Other(other.to_string()),
                }
        }

        /// Only edit, add and move/add take part in renames.
        pub fn is_renamable(&self) -> bool {
                !matches!(self, OpenAction::Other(_))
        }
}

/// One parsed `opened` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedLine {
        pub depot_path: String,
        pub action: OpenAction,
}

/// Parse `opened` output. Lines that don't match are skipped.
pub fn parse_opened(text: &str) -> Vec<OpenedLine> {
        text.lines()
                .filter_map(|line| {
                        let cap = OPENED_LINE.captures(line.trim())?;
                        Some(OpenedLine {
                                depot_path: cap[1].replace('\\', "/"),
                                action: OpenAction::from_keyword(&cap[2]),
                        })
                })
                .collect()
}

/// Depot / client / local triple from `where`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
        pub depot: String,
        pub client: String,
        pub local: String,
}

impl PathMapping {
        /// Client-side path segments below the workspace root (`//ws/a/b` ~> `[a, b]`).
        pub fn client_segments(&self) -> Vec<&str> {
                self.client.trim_start_matches('/').split('/').skip(1).filter(|s| !s.is_empty()).collect()
        }
}

/// Parse `where` output: the first mapped line wins.
///
/// Lines starting with `-` are exclusion mappings and are ignored.
pub fn parse_where(text: &str) -> Option<PathMapping> {
        text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('-')).find_map(|line| {
                let cap = WHERE_LINE.captures(line)?;
                Some(PathMapping {
                        depot: cap[1].to_string(),
                        client: cap[2].to_string(),
                        local: cap[3].trim().to_string(),
                })
        })
}

/// A pending changelist offered for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
        pub id: u64,
        pub description: String,
}

impl PendingChange {
        /// `"12345 - fix naming case"`
        pub fn label(&self) -> String {
                format!("{} - {}", self.id, self.description)
        }
}

/// Parse `changes` output.
pub fn parse_changes(text: &str) -> Vec<PendingChange> {
        text.lines()
                .filter_map(|line| {
                        let cap = CHANGE_LINE.captures(line.trim())?;
                        let id = cap[1].parse().ok()?;
                        Some(PendingChange { id, description: cap[2].trim().to_string() })
                })
                .collect()
}

/// Pick `NAME=value` out of `p4 set` output. Names compare case-insensitively.
///
/// The value stops before a ` (set)`/` (config)` annotation.
pub fn parse_set_value(text: &str, name: &str) -> Option<String> {
        SET_LINE.captures_iter(text)
                .find(|cap| cap[1].eq_ignore_ascii_case(name))
                .map(|cap| cap[2].trim().to_string())
                .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
        use expect_test::expect;
        use test_log::test;

        use super::*;

        #[test]
        fn opened_lines() {
                let text = "\
//depot/Game/Content/Hero.uasset#3 - edit default change (binary+l) *locked*
//depot/Game/Content/New File.txt#1 - add change 123 (text)
//depot/Game/Content/moved.txt#1 - move/add default change (text)
//depot/Game/Content/gone.txt#2 - delete default change (text)
//depot/Game/Content/old.txt#2 - move/delete default change (text)
garbage line
";
                let parsed = parse_opened(text);
                let actual = parsed
                        .iter()
                        .map(|l| format!("{} | {:?}", l.depot_path, l.action))
                        .collect::<Vec<_>>()
                        .join("\n");
                expect![[r#"
                    //depot/Game/Content/Hero.uasset | Edit
                    //depot/Game/Content/New File.txt | Add
                    //depot/Game/Content/moved.txt | MoveAdd
                    //depot/Game/Content/gone.txt | Other("delete")
                    //depot/Game/Content/old.txt | Other("move/delete")"#]]
                .assert_eq(&actual);
                assert_eq!(parsed.iter().filter(|l| l.action.is_renamable()).count(), 3);
        }

        #[test]
        fn opened_names_containing_dashes() {
                let text = "\
//depot/x/Foo - Copy.TXT#1 - edit default change (text)
//depot/x/a - b - c.txt#12 - move/add change 7 (text)
";
                let parsed = parse_opened(text);
                assert_eq!(
                        parsed,
                        [
                                OpenedLine { depot_path: "//depot/x/Foo - Copy.TXT".into(), action: OpenAction::Edit },
                                OpenedLine { depot_path: "//depot/x/a - b - c.txt".into(), action: OpenAction::MoveAdd },
                        ]
                );
        }

        #[test]
        fn opened_line_without_revision_is_skipped() {
                assert!(parse_opened("//depot/x/a.txt - edit default change (text)\n").is_empty());
        }

        #[test]
        fn where_with_spaces_in_local_path() {
                let text = "//depot/Game/File.txt //alice_ws/Game/File.txt /home/alice/my ws/Game/File.txt\n";
                let mapping = parse_where(text).unwrap();
                assert_eq!(mapping.depot, "//depot/Game/File.txt");
                assert_eq!(mapping.client, "//alice_ws/Game/File.txt");
                assert_eq!(mapping.local, "/home/alice/my ws/Game/File.txt");
                assert_eq!(mapping.client_segments(), ["Game", "File.txt"]);
        }

        #[test]
        fn where_skips_exclusions_and_empty() {
                assert_eq!(parse_where(""), None);
                let text = "-//depot/x/a.txt //ws/x/a.txt /w/x/a.txt\n//depot/y/a.txt //ws/y/a.txt /w/y/a.txt\n";
                assert_eq!(parse_where(text).unwrap().depot, "//depot/y/a.txt");
        }

        #[test]
        fn changes_lines() {
                let text = "\
Change 12345 on 2025/08/10 by alice@alice_ws *pending* 'Fix naming case '
Change 678 on 2025/08/11 by alice@alice_ws *pending* 'WIP'
not a change
";
                let changes = parse_changes(text);
                assert_eq!(changes.len(), 2);
                assert_eq!(changes[0].label(), "12345 - Fix naming case");
                assert_eq!(changes[1].id, 678);
        }

        #[test]
        fn set_values() {
                let text = "P4CLIENT=alice_ws (set)\nP4PORT=ssl:perforce:1666 (config 'C:\\p4config')\nP4USER=alice\n";
                assert_eq!(parse_set_value(text, "P4PORT").as_deref(), Some("ssl:perforce:1666"));
                assert_eq!(parse_set_value(text, "p4user").as_deref(), Some("alice"));
                assert_eq!(parse_set_value(text, "P4CLIENT").as_deref(), Some("alice_ws"));
                assert_eq!(parse_set_value(text, "P4PASSWD"), None);
        }
}
