use super::enricher::EnrichedUnit;
use super::segmenter::UnitKind;
use crate::store::models::ChunkMetadata;
use regex::Regex;
use std::sync::LazyLock;

/// Member definitions sit one level (four columns) deeper than the unit's
/// own header line.
const INDENT_WIDTH: usize = 4;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence regex is valid"));

/// One embeddable piece of a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Splits units into pieces of at most `max_size` characters (soft limit for
/// code, see [`Chunker::split_code`]).
///
/// `overlap` is carried for configuration compatibility only: no splitting
/// path duplicates text across chunk boundaries.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_size: usize,
    overlap: usize,
    store_content: bool,
}

impl Chunker {
    pub fn new(max_size: usize, overlap: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            overlap,
            store_content: true,
        }
    }

    /// Whether chunk text is copied into each chunk's metadata record.
    pub fn with_content(mut self, store_content: bool) -> Self {
        self.store_content = store_content;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn chunk_all(&self, units: &[EnrichedUnit]) -> Vec<Chunk> {
        units.iter().flat_map(|u| self.chunk(u)).collect()
    }

    /// Split one unit and stamp every piece with its position and the total
    /// piece count.
    pub fn chunk(&self, unit: &EnrichedUnit) -> Vec<Chunk> {
        let pieces = match unit.unit.kind {
            UnitKind::Class | UnitKind::Function => {
                self.split_code(&unit.unit.source_text, unit.unit.kind)
            }
            UnitKind::RawText => self.split_text(&unit.unit.source_text),
        };

        let chunk_count = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                metadata: self.metadata_for(unit, chunk_index, chunk_count, &text),
                text,
            })
            .collect()
    }

    fn metadata_for(
        &self,
        unit: &EnrichedUnit,
        chunk_index: usize,
        chunk_count: usize,
        text: &str,
    ) -> ChunkMetadata {
        let u = &unit.unit;
        ChunkMetadata {
            file_path: u.file_path.clone(),
            kind: u.kind,
            name: u.name.clone(),
            docstring: u.docstring.clone(),
            members: u.members.clone(),
            bases: u.bases.clone(),
            parameters: u.parameters.clone(),
            start_line: Some(u.start_line),
            end_line: Some(u.end_line),
            imports: unit.imports.clone(),
            called_symbols: unit.called_symbols.clone(),
            branch_count: unit.branch_count,
            chunk_index,
            chunk_count,
            content: self.store_content.then(|| text.to_string()),
        }
    }

    /// Split class or function source at member boundaries.
    ///
    /// Text within `max_size` stays whole; functions may stay whole up to
    /// twice that. Otherwise a cut is made before every decorator run and
    /// before every `def`/`class` line exactly one level below the first line,
    /// and before any line that would grow the current piece past
    /// 1.5 × `max_size`. A decorator run is never cut from the definition it
    /// annotates. Pieces joined with `\n` give back the input.
    pub fn split_code(&self, text: &str, kind: UnitKind) -> Vec<String> {
        let len = char_len(text);
        if len <= self.max_size {
            return vec![text.to_string()];
        }
        if kind == UnitKind::Function && len <= self.max_size * 2 {
            return vec![text.to_string()];
        }

        let lines: Vec<&str> = text.split('\n').collect();
        let base_indent = lines
            .iter()
            .map(|l| split_indent(l))
            .find(|(_, stripped)| !stripped.is_empty())
            .map(|(indent, _)| indent);
        let in_run = decorator_runs(&lines);

        // Integer form of `size > max_size * 1.5`.
        let soft_limit = self.max_size * 3 / 2;
        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_size = 0;

        for (i, line) in lines.iter().enumerate() {
            let (indent, stripped) = split_indent(line);
            let follows_run = i > 0 && in_run[i - 1];
            let member_level = base_indent.map_or(0, |base| base + INDENT_WIDTH);
            // Runs deeper than member level only keep their definition; they
            // do not open a piece.
            let boundary = !follows_run
                && if in_run[i] {
                    indent <= member_level
                } else {
                    is_definition_line(stripped) && base_indent.is_some() && indent == member_level
                };

            if boundary && !current.is_empty() {
                chunks.push(current.join("\n"));
                current.clear();
                current_size = 0;
            }

            // A run is measured together with its definition line and never
            // cut inside; the cut, if any, goes before the run.
            let line_size = char_len(line) + 1;
            let needed: usize = if in_run[i] && !follows_run {
                let run_end = (i..lines.len()).find(|&j| !in_run[j]).unwrap_or(lines.len());
                lines[i..=run_end.min(lines.len() - 1)]
                    .iter()
                    .map(|l| char_len(l) + 1)
                    .sum()
            } else {
                line_size
            };
            if !follows_run && !current.is_empty() && current_size + needed > soft_limit {
                chunks.push(current.join("\n"));
                current.clear();
                current_size = 0;
            }

            current.push(line);
            current_size += line_size;
        }

        if !current.is_empty() {
            chunks.push(current.join("\n"));
        }

        if chunks.is_empty() {
            return split_fixed(text, self.max_size);
        }
        chunks
    }

    /// Split prose by paragraph, then sentence, then fixed-size slices,
    /// packing pieces until the next one would exceed `max_size`.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if char_len(text) <= self.max_size {
            return vec![text.to_string()];
        }

        let mut packer = Packer::new(self.max_size);
        for (para_no, para) in text.split("\n\n").enumerate() {
            let para_size = char_len(para) + 2;
            packer.make_room(para_size);

            if para_size <= self.max_size {
                packer.push(para, para_size, para_no);
                continue;
            }

            for sentence in split_sentences(para) {
                let sentence_size = char_len(sentence) + 1;
                packer.make_room(sentence_size);
                if sentence_size > self.max_size {
                    packer.flush();
                    packer.chunks.extend(split_fixed(sentence, self.max_size));
                    continue;
                }
                packer.push(sentence, sentence_size, para_no);
            }
        }
        packer.finish()
    }
}

/// Accumulates text pieces into size-bounded chunks. Pieces from the same
/// paragraph are joined with a space, paragraphs with a blank line.
struct Packer {
    max_size: usize,
    chunks: Vec<String>,
    current: String,
    current_size: usize,
    last_para: Option<usize>,
}

impl Packer {
    fn new(max_size: usize) -> Self {
        Self {
            max_size,
            chunks: Vec::new(),
            current: String::new(),
            current_size: 0,
            last_para: None,
        }
    }

    /// Close the current chunk if `size` more would overflow it.
    fn make_room(&mut self, size: usize) {
        if self.current_size > 0 && self.current_size + size > self.max_size {
            self.flush();
        }
    }

    fn push(&mut self, piece: &str, size: usize, para_no: usize) {
        if self.current_size > 0 {
            let sep = if self.last_para == Some(para_no) { " " } else { "\n\n" };
            self.current.push_str(sep);
        }
        self.current.push_str(piece);
        self.current_size += size;
        self.last_para = Some(para_no);
    }

    fn flush(&mut self) {
        if self.current_size > 0 {
            self.chunks.push(std::mem::take(&mut self.current));
            self.current_size = 0;
            self.last_para = None;
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

fn is_definition_line(stripped: &str) -> bool {
    stripped.starts_with("def ") || stripped.starts_with("class ") || stripped.starts_with("async def ")
}

fn split_indent(line: &str) -> (usize, &str) {
    let stripped = line.trim_start();
    (char_len(line) - char_len(stripped), stripped)
}

/// Marks the lines of every decorator run: `@` lines, with their bracketed
/// continuations and blank lines, that lead directly to a `def`/`class` at the
/// same indent. The definition line itself is not marked. `@` lines that lead
/// anywhere else (docstring tags such as `@param`, matrix products) are
/// ordinary lines.
fn decorator_runs(lines: &[&str]) -> Vec<bool> {
    let mut marks = vec![false; lines.len()];
    let mut i = 0;
    while i < lines.len() {
        let (indent, stripped) = split_indent(lines[i]);
        if !stripped.starts_with('@') {
            i += 1;
            continue;
        }

        let mut depth = 0i32;
        let mut j = i;
        while j < lines.len() {
            let (next_indent, next) = split_indent(lines[j]);
            if depth > 0 || next.is_empty() || (next_indent == indent && next.starts_with('@')) {
                depth = (depth + bracket_delta(next)).max(0);
                j += 1;
                continue;
            }
            break;
        }

        let closes = lines.get(j).is_some_and(|l| {
            let (def_indent, def) = split_indent(l);
            def_indent == indent && is_definition_line(def)
        });
        if closes {
            marks[i..j].iter_mut().for_each(|m| *m = true);
            i = j;
        } else {
            i += 1;
        }
    }
    marks
}

/// Net bracket nesting opened by a line.
fn bracket_delta(line: &str) -> i32 {
    line.chars()
        .map(|c| match c {
            '(' | '[' | '{' => 1,
            ')' | ']' | '}' => -1,
            _ => 0,
        })
        .sum()
}

/// Sentences end at `.`, `!` or `?` followed by whitespace; the whitespace
/// itself is dropped.
fn split_sentences(para: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(para) {
        // Punctuation is one ASCII byte.
        sentences.push(&para[start..m.start() + 1]);
        start = m.end();
    }
    if start < para.len() {
        sentences.push(&para[start..]);
    }
    sentences
}

/// Slices of exactly `size` characters (the last may be shorter), no overlap.
pub fn split_fixed(text: &str, size: usize) -> Vec<String> {
    if size == 0 || char_len(text) <= size {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
