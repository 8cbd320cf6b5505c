//! SIMD-friendly helpers that power hot paths of the engines.

/// SIMD-accelerated ASCII operations.
pub mod ascii {

    /// Convert ASCII characters to lowercase using optimized byte operations.
    ///
    /// Bytes are processed in chunks of eight so the compiler can vectorize
    /// the loop.
    pub fn to_lowercase_optimized(input: &str) -> String {
        let bytes = input.as_bytes();
        let mut result = Vec::with_capacity(bytes.len());

        let chunks = bytes.chunks_exact(8);
        let remainder = chunks.remainder();

        for chunk in chunks {
            let mut processed = [0u8; 8];
            for (i, &byte) in chunk.iter().enumerate() {
                processed[i] = byte.to_ascii_lowercase();
            }
            result.extend_from_slice(&processed);
        }

        for &byte in remainder {
            result.push(byte.to_ascii_lowercase());
        }

        String::from_utf8(result).unwrap_or_else(|_| input.to_lowercase())
    }

    /// Lowercase `input`, taking the byte fast path when it is pure ASCII.
    pub fn to_lowercase(input: &str) -> String {
        if input.is_ascii() && input.len() >= 16 {
            to_lowercase_optimized(input)
        } else {
            input.to_lowercase()
        }
    }
}

/// SIMD-accelerated numerical operations for scoring.
pub mod numeric {
    use wide::f32x8;

    /// Number of lanes processed together by [`batch_bm25`].
    pub const LANES: usize = 8;

    /// Batch BM25 term contribution for a group of postings.
    ///
    /// For every `i` computes
    /// `idf * tf[i] / (tf[i] + k1 * (1 - b + b * dl[i] / avg_doc_len))`
    /// and appends it to `out`. Eight postings are scored per instruction;
    /// the tail falls back to the scalar formula with the same operation order.
    pub fn batch_bm25(
        idf: f32,
        k1: f32,
        b: f32,
        avg_doc_len: f32,
        term_freqs: &[f32],
        doc_lens: &[f32],
        out: &mut Vec<f32>,
    ) {
        debug_assert_eq!(term_freqs.len(), doc_lens.len());
        out.reserve(term_freqs.len());

        let v_idf = f32x8::splat(idf);
        let v_k1 = f32x8::splat(k1);
        let v_b = f32x8::splat(b);
        let v_one_minus_b = f32x8::splat(1.0 - b);
        let v_avg = f32x8::splat(avg_doc_len);

        let tf_chunks = term_freqs.chunks_exact(LANES);
        let tf_remainder = tf_chunks.remainder();
        let dl_chunks = doc_lens.chunks_exact(LANES);
        let dl_remainder = dl_chunks.remainder();

        for (tf_chunk, dl_chunk) in tf_chunks.zip(dl_chunks) {
            let mut tf = [0.0f32; LANES];
            let mut dl = [0.0f32; LANES];
            tf.copy_from_slice(tf_chunk);
            dl.copy_from_slice(dl_chunk);

            let v_tf = f32x8::from(tf);
            let v_dl = f32x8::from(dl);
            let norm = v_one_minus_b + v_b * (v_dl / v_avg);
            let score = v_idf * v_tf / (v_tf + v_k1 * norm);
            out.extend_from_slice(&score.to_array());
        }

        let one_minus_b = 1.0 - b;
        for (&tf, &dl) in tf_remainder.iter().zip(dl_remainder) {
            let norm = one_minus_b + b * (dl / avg_doc_len);
            out.push(idf * tf / (tf + k1 * norm));
        }
    }
}
