//! Content normalizer: turns raw markdown into an ordered sequence of
//! typed blocks. Inline markup is carried through verbatim; block order
//! is the document's reading order and is preserved end-to-end.
//! Constructs the tokenizer does not recognize (raw HTML, reference
//! definitions) are skipped silently.

/// One semantic unit of normalized document content.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { text: String, level: u8 },
    Paragraph { text: String },
    List { items: Vec<String> },
    OrderedList { items: Vec<String> },
    Code { text: String, language: String },
    Blockquote { text: String },
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Rule,
}

pub fn normalize(raw: &str) -> Vec<Block> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim_start();

        if trimmed.is_empty() {
            i += 1;
            continue;
        }

        if let Some(fence) = fence_marker(trimmed) {
            let info = trimmed[fence.len()..].trim();
            let language = info
                .split_whitespace()
                .next()
                .unwrap_or("text")
                .to_string();
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() {
                let candidate = lines[i].trim_start();
                if fence_marker(candidate) == Some(fence) {
                    i += 1;
                    break;
                }
                body.push(lines[i]);
                i += 1;
            }
            blocks.push(Block::Code {
                text: body.join("\n"),
                language,
            });
            continue;
        }

        if let Some((level, text)) = heading_line(trimmed) {
            blocks.push(Block::Heading {
                text: text.to_string(),
                level,
            });
            i += 1;
            continue;
        }

        if is_rule_line(trimmed) {
            blocks.push(Block::Rule);
            i += 1;
            continue;
        }

        if trimmed.starts_with('>') {
            let mut parts = Vec::new();
            while i < lines.len() {
                let quote = lines[i].trim_start();
                if !quote.starts_with('>') {
                    break;
                }
                let inner = quote[1..].strip_prefix(' ').unwrap_or(&quote[1..]);
                if !inner.trim().is_empty() {
                    parts.push(inner.trim().to_string());
                }
                i += 1;
            }
            blocks.push(Block::Blockquote {
                text: parts.join(" "),
            });
            continue;
        }

        if is_table_start(&lines, i) {
            let headers = split_table_row(lines[i].trim());
            i += 2;
            let mut rows = Vec::new();
            while i < lines.len() {
                let candidate = lines[i].trim();
                if candidate.is_empty() || !candidate.contains('|') {
                    break;
                }
                rows.push(split_table_row(candidate));
                i += 1;
            }
            blocks.push(Block::Table { headers, rows });
            continue;
        }

        if indented_code_line(line).is_some() {
            let mut body = Vec::new();
            while i < lines.len() {
                let Some(code) = indented_code_line(lines[i]) else {
                    break;
                };
                body.push(code);
                i += 1;
            }
            blocks.push(Block::Code {
                text: body.join("\n"),
                language: "text".to_string(),
            });
            continue;
        }

        if bullet_item(trimmed).is_some() {
            let items = collect_list_items(&lines, &mut i, bullet_item);
            blocks.push(Block::List { items });
            continue;
        }

        if ordered_item(trimmed).is_some() {
            let items = collect_list_items(&lines, &mut i, ordered_item);
            blocks.push(Block::OrderedList { items });
            continue;
        }

        if trimmed.starts_with('<') {
            // Raw HTML block: skip through the end of its paragraph.
            while i < lines.len() && !lines[i].trim().is_empty() {
                i += 1;
            }
            continue;
        }

        // Paragraph: accumulate until a blank line or the start of
        // another block construct.
        let mut parts = vec![trimmed.trim_end().to_string()];
        i += 1;
        while i < lines.len() {
            let next = lines[i].trim_start();
            if next.is_empty() || starts_new_block(&lines, i) {
                break;
            }
            parts.push(next.trim_end().to_string());
            i += 1;
        }
        blocks.push(Block::Paragraph {
            text: parts.join(" "),
        });
    }

    blocks
}

fn fence_marker(line: &str) -> Option<&'static str> {
    if line.starts_with("```") {
        Some("```")
    } else if line.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn heading_line(line: &str) -> Option<(u8, &str)> {
    let level = line.chars().take_while(|ch| *ch == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if rest.is_empty() {
        return Some((level as u8, ""));
    }
    let text = rest.strip_prefix(' ')?;
    Some((level as u8, text.trim()))
}

fn is_rule_line(line: &str) -> bool {
    let mut marker = None;
    let mut count = 0;
    for ch in line.chars() {
        if ch == ' ' || ch == '\t' {
            continue;
        }
        if !matches!(ch, '-' | '*' | '_') {
            return false;
        }
        match marker {
            None => marker = Some(ch),
            Some(m) if m != ch => return false,
            _ => {}
        }
        count += 1;
    }
    count >= 3
}

fn bullet_item(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("+ "))?;
    Some(rest.trim())
}

fn ordered_item(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(|ch| ch.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    let rest = rest.strip_prefix(' ')?;
    Some(rest.trim())
}

fn collect_list_items(
    lines: &[&str],
    i: &mut usize,
    parse: fn(&str) -> Option<&str>,
) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    while *i < lines.len() {
        let line = lines[*i];
        let trimmed = line.trim_start();
        if let Some(item) = parse(trimmed) {
            items.push(item.to_string());
            *i += 1;
        } else if !trimmed.is_empty()
            && line.starts_with(' ')
            && !items.is_empty()
            && !starts_new_block(lines, *i)
        {
            // Lazy continuation of the previous item.
            let last = items.last_mut().unwrap();
            last.push(' ');
            last.push_str(trimmed.trim_end());
            *i += 1;
        } else {
            break;
        }
    }
    items
}

fn is_table_start(lines: &[&str], i: usize) -> bool {
    if !lines[i].contains('|') {
        return false;
    }
    let Some(next) = lines.get(i + 1) else {
        return false;
    };
    is_table_separator(next.trim())
}

fn is_table_separator(line: &str) -> bool {
    !line.is_empty()
        && line.contains('-')
        && line.chars().all(|ch| matches!(ch, '-' | '|' | ':' | ' '))
}

fn split_table_row(line: &str) -> Vec<String> {
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = line.strip_suffix('|').unwrap_or(line);
    line.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn starts_new_block(lines: &[&str], i: usize) -> bool {
    let trimmed = lines[i].trim_start();
    fence_marker(trimmed).is_some()
        || heading_line(trimmed).is_some()
        || is_rule_line(trimmed)
        || trimmed.starts_with('>')
        || bullet_item(trimmed).is_some()
        || ordered_item(trimmed).is_some()
        || is_table_start(lines, i)
}

fn indented_code_line(line: &str) -> Option<&str> {
    line.strip_prefix("    ").or_else(|| line.strip_prefix('\t'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_carry_level_and_text() {
        let blocks = normalize("# Title\n\n### Sub title");
        assert_eq!(
            blocks,
            vec![
                Block::Heading {
                    text: "Title".to_string(),
                    level: 1
                },
                Block::Heading {
                    text: "Sub title".to_string(),
                    level: 3
                },
            ]
        );
    }

    #[test]
    fn paragraph_lines_are_joined() {
        let blocks = normalize("first line\nsecond line\n\nnext paragraph");
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph {
                    text: "first line second line".to_string()
                },
                Block::Paragraph {
                    text: "next paragraph".to_string()
                },
            ]
        );
    }

    #[test]
    fn bullet_and_ordered_lists_are_distinct() {
        let blocks = normalize("- one\n- two\n\n1. first\n2. second");
        assert_eq!(
            blocks,
            vec![
                Block::List {
                    items: vec!["one".to_string(), "two".to_string()]
                },
                Block::OrderedList {
                    items: vec!["first".to_string(), "second".to_string()]
                },
            ]
        );
    }

    #[test]
    fn fenced_code_keeps_newlines_and_language() {
        let blocks = normalize("```rust\nfn main() {\n    println!();\n}\n```");
        assert_eq!(
            blocks,
            vec![Block::Code {
                text: "fn main() {\n    println!();\n}".to_string(),
                language: "rust".to_string(),
            }]
        );
    }

    #[test]
    fn fence_without_info_string_defaults_to_text() {
        let blocks = normalize("```\nplain\n```");
        assert_eq!(
            blocks,
            vec![Block::Code {
                text: "plain".to_string(),
                language: "text".to_string(),
            }]
        );
    }

    #[test]
    fn indented_code_is_recognized() {
        let blocks = normalize("    let a = 1;\n    let b = 2;");
        assert_eq!(
            blocks,
            vec![Block::Code {
                text: "let a = 1;\nlet b = 2;".to_string(),
                language: "text".to_string(),
            }]
        );
    }

    #[test]
    fn blockquote_lines_merge() {
        let blocks = normalize("> quoted text\n> over two lines");
        assert_eq!(
            blocks,
            vec![Block::Blockquote {
                text: "quoted text over two lines".to_string()
            }]
        );
    }

    #[test]
    fn tables_split_headers_and_rows() {
        let blocks = normalize("| A | B |\n|---|---|\n| 1 | 2 |\n| 3 | 4 |");
        assert_eq!(
            blocks,
            vec![Block::Table {
                headers: vec!["A".to_string(), "B".to_string()],
                rows: vec![
                    vec!["1".to_string(), "2".to_string()],
                    vec!["3".to_string(), "4".to_string()],
                ],
            }]
        );
    }

    #[test]
    fn rules_accept_all_three_markers() {
        for src in ["---", "***", "___", "- - -"] {
            assert_eq!(normalize(src), vec![Block::Rule], "source {src:?}");
        }
    }

    #[test]
    fn html_blocks_are_skipped_silently() {
        let blocks = normalize("<div>\nraw html\n</div>\n\nafter");
        assert_eq!(
            blocks,
            vec![Block::Paragraph {
                text: "after".to_string()
            }]
        );
    }

    #[test]
    fn reading_order_is_preserved() {
        let src = "# H\n\npara\n\n- item\n\n> quote\n\n---\n";
        let blocks = normalize(src);
        assert!(matches!(blocks[0], Block::Heading { .. }));
        assert!(matches!(blocks[1], Block::Paragraph { .. }));
        assert!(matches!(blocks[2], Block::List { .. }));
        assert!(matches!(blocks[3], Block::Blockquote { .. }));
        assert!(matches!(blocks[4], Block::Rule));
    }

    #[test]
    fn empty_input_yields_no_blocks() {
        assert!(normalize("").is_empty());
        assert!(normalize("\n\n  \n").is_empty());
    }

    #[test]
    fn list_continuation_lines_fold_into_their_item() {
        let blocks = normalize("- first item\n  continues here\n- second");
        assert_eq!(
            blocks,
            vec![Block::List {
                items: vec![
                    "first item continues here".to_string(),
                    "second".to_string()
                ]
            }]
        );
    }
}
