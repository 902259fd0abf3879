use rayon::prelude::*;

/// Maps `f` over roughly one chunk of `data` per CPU in parallel, streaming the results back as
/// chunks complete. Output order is unspecified.
pub(crate) fn par_chunks<T, F, R>(data: &[T], f: F) -> impl Iterator<Item = R>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> Vec<R> + Sync,
{
    let (s, r) = crossbeam_channel::unbounded();
    let nr_cpus = num_cpus::get();
    let nr_elems = data.len();
    let chunk_size = std::cmp::max(nr_elems / nr_cpus, 1);
    data.chunks(chunk_size)
        .par_bridge()
        .for_each_with(s, |s, chunk| {
            let v = f(chunk);
            // The receiver outlives every sender, so sending cannot fail.
            let _ = s.send(v);
        });
    r.into_iter().flat_map(|v| v.into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn par_chunks_visits_everything() {
        let data = (0..1000).collect::<Vec<u32>>();
        let mut out = par_chunks(&data, |chunk| chunk.iter().map(|x| x * 2).collect()).collect::<Vec<_>>();
        out.sort();
        assert_eq!(out, data.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn par_chunks_handles_empty_input() {
        let data: Vec<u32> = Vec::new();
        assert_eq!(par_chunks(&data, |chunk| chunk.to_vec()).count(), 0);
    }
}
