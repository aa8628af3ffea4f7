use memchr::memchr;

/// One unit of dispatchable scan work.
///
/// `index` is the chunk's position in the ordered split of its input;
/// result aggregation is keyed by it, never by completion order. `offset`
/// is the byte offset of `text` within the split input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
	pub index: usize,
	pub text: String,
	pub offset: usize,
}

/// Splits `text` into line-aligned chunks of roughly `target_bytes` each.
///
/// Whole lines accumulate into the current chunk until it reaches
/// `target_bytes`, then the chunk is cut at the line boundary. A single line
/// longer than `target_bytes` is cut at `char` boundaries at `target_bytes`
/// strides instead. Concatenating the chunk texts in index order reproduces
/// `text` exactly; offsets are exact. Empty input yields no chunks.
///
/// Deterministic: identical input and target always produce the same split.
pub fn split_chunks(text: &str, target_bytes: usize) -> Vec<Chunk> {
	let target = target_bytes.max(1);
	let bytes = text.as_bytes();
	let mut chunks = Vec::new();
	let mut chunk_start = 0;
	let mut cursor = 0;

	while cursor < text.len() {
		let line_end = memchr(b'\n', &bytes[cursor..]).map_or(text.len(), |i| cursor + i + 1);

		if line_end - cursor > target {
			// Oversize line: flush accumulated whole lines, then cut inside
			// the line at char boundaries.
			if cursor > chunk_start {
				push_chunk(&mut chunks, text, chunk_start, cursor);
			}
			let mut piece_start = cursor;
			while line_end - piece_start > target {
				let mut cut = piece_start + target;
				while !text.is_char_boundary(cut) {
					cut -= 1;
				}
				if cut == piece_start {
					// Target smaller than one char: take the whole char.
					cut = piece_start + 1;
					while cut < line_end && !text.is_char_boundary(cut) {
						cut += 1;
					}
				}
				push_chunk(&mut chunks, text, piece_start, cut);
				piece_start = cut;
			}
			chunk_start = piece_start;
		}
		cursor = line_end;

		if cursor - chunk_start >= target {
			push_chunk(&mut chunks, text, chunk_start, cursor);
			chunk_start = cursor;
		}
	}

	if chunk_start < text.len() {
		push_chunk(&mut chunks, text, chunk_start, text.len());
	}
	chunks
}

fn push_chunk(chunks: &mut Vec<Chunk>, text: &str, start: usize, end: usize) {
	chunks.push(Chunk {
		index: chunks.len(),
		text: text[start..end].to_string(),
		offset: start,
	});
}
