/// Average glyph width assumed when fitting text to a page, in drawing units.
pub const AVERAGE_CHAR_WIDTH: f32 = 6.0;

/// Characters that fit on one line of `max_width_units`, never less than one.
pub fn chars_per_line(max_width_units: f32) -> usize {
    ((max_width_units / AVERAGE_CHAR_WIDTH).floor() as usize).max(1)
}

/// Greedy word wrap to `max_width_units / 6` characters per line.
///
/// Whitespace runs collapse to single spaces and words longer than a line are split,
/// so no returned line exceeds the limit.
pub fn wrap(text: &str, max_width_units: f32) -> Vec<String> {
    let width = chars_per_line(max_width_units);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();

        let needed = if current_len == 0 {
            chars.len()
        } else {
            current_len + 1 + chars.len()
        };
        if needed <= width {
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(chars.iter());
            current_len += chars.len();
            continue;
        }

        if chars.len() <= width {
            lines.push(std::mem::take(&mut current));
            current.extend(chars.iter());
            current_len = chars.len();
            continue;
        }

        // Word longer than a line: fill the remainder of the current line, then chunk.
        if current_len > 0 {
            let room = width.saturating_sub(current_len + 1);
            if room > 0 {
                current.push(' ');
                current.extend(chars.drain(..room));
            }
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        while chars.len() > width {
            lines.push(chars.drain(..width).collect());
        }
        current.extend(chars.iter());
        current_len = chars.len();
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}
