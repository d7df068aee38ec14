use crate::{Segment, Seconds, TimelineLayout};

/// Draw the timeline as a one-line bar of `columns` characters followed by a
/// legend, for terminals. Segment blocks cycle through letters; split
/// handles are drawn as `|`.
pub fn render_ascii(segments: &[Segment], duration: Seconds, columns: usize) -> Option<String> {
    if columns == 0 {
        return None;
    }
    let layout = TimelineLayout::compute(segments, duration, columns as f32)?;
    let scale = columns as f32 / layout.content_width;

    let mut bar = vec![' '; columns];
    for block in &layout.blocks {
        let glyph = glyph_for(block.index);
        let start = (block.x * scale).floor() as usize;
        let end = ((block.x + block.width) * scale).ceil() as usize;
        for cell in bar.iter_mut().take(end.min(columns)).skip(start) {
            *cell = glyph;
        }
    }
    for handle in &layout.handles {
        let col = (handle.x * scale).round() as usize;
        if col > 0 && col < columns {
            bar[col] = '|';
        }
    }

    let mut out = String::with_capacity(columns + segments.len() * 32);
    out.push('[');
    out.extend(bar);
    out.push_str("]\n");
    for (i, seg) in segments.iter().enumerate() {
        out.push_str(&format!(
            "  {} {:>3}  {:<16} {:>9.3}s - {:>9.3}s\n",
            glyph_for(i),
            i,
            seg.label,
            seg.start_time,
            seg.end_time
        ));
    }
    Some(out)
}

fn glyph_for(index: usize) -> char {
    const GLYPHS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    GLYPHS[index % GLYPHS.len()] as char
}
