/// Simple HTML tag stripper: drops tags and the contents of script and
/// style blocks, then collapses blank lines.
pub(crate) fn strip_tags(html: &str) -> String {
    let chars: Vec<char> = html.chars().collect();
    // Tags are ASCII; per-char lowering keeps indices aligned.
    let lower: Vec<char> = html.chars().map(|c| c.to_ascii_lowercase()).collect();

    let mut result = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    let mut i = 0;
    while i < chars.len() {
        if in_script {
            if matches_at(&lower, i, "</script>") {
                in_script = false;
                i += "</script>".len();
            } else {
                i += 1;
            }
            continue;
        }
        if in_style {
            if matches_at(&lower, i, "</style>") {
                in_style = false;
                i += "</style>".len();
            } else {
                i += 1;
            }
            continue;
        }

        if matches_at(&lower, i, "<script") {
            in_script = true;
            i += 1;
            continue;
        }
        if matches_at(&lower, i, "<style") {
            in_style = true;
            i += 1;
            continue;
        }

        let c = chars[i];
        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
        } else if !in_tag {
            result.push(c);
        }
        i += 1;
    }

    let lines: Vec<&str> = result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    lines.join("\n")
}

fn matches_at(lower: &[char], start: usize, pattern: &str) -> bool {
    let mut idx = start;
    for pc in pattern.chars() {
        match lower.get(idx) {
            Some(&c) if c == pc => idx += 1,
            _ => return false,
        }
    }
    true
}
