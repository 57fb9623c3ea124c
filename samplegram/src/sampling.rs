//! Bounded uniform sampling over unbounded streams.
//!
//! Histograms keep a fixed-size, uniformly representative subset of every
//! sample they have ever seen. These helpers implement single-pass
//! reservoir sampling plus the weighted merge used when two independently
//! sampled reservoirs are combined, e.g. during shard reduction.

use rand::Rng;

/// Offer `item` to a bounded reservoir.
///
/// `stream_length` is the length of the stream *including* `item`. While
/// the stream still fits in `capacity` the item is stored directly (slot
/// `stream_length - 1` is overwritten if it already exists, which services
/// merge replay). Once the stream has outgrown the reservoir, the item is
/// kept with probability `capacity / stream_length`, evicting a uniformly
/// random resident. That exact policy keeps the reservoir uniform over the
/// entire stream seen so far.
pub fn uniformly_sample_stream<T>(
    reservoir: &mut Vec<T>,
    stream_length: u64,
    item: T,
    capacity: usize,
    rng: &mut impl Rng,
) {
    if stream_length <= capacity as u64 {
        let slot = (stream_length - 1) as usize;
        if slot < reservoir.len() {
            reservoir[slot] = item;
        } else {
            reservoir.push(item);
        }
        return;
    }
    if reservoir.is_empty() {
        return;
    }
    let keep_probability = capacity as f64 / stream_length as f64;
    if rng.gen::<f64>() > keep_probability {
        return;
    }
    let slot = rng.gen_range(0..reservoir.len());
    reservoir[slot] = item;
}

/// Merge reservoir `b` (sampled from a stream of `stream_length_b` items)
/// into reservoir `a` (sampled from `stream_length_a` items), leaving `a`
/// uniformly representative of the combined stream.
///
/// When one side never overflowed its capacity, its items are replayed
/// into the other side one at a time. When both sides have already dropped
/// data, each output slot draws its source with probability proportional
/// to that source's stream length, and the winners are taken from each
/// reservoir without replacement. Naive concatenate-then-trim would bias
/// the result toward the larger reservoir.
pub fn merge_sampled_streams<T: Clone>(
    a: &mut Vec<T>,
    stream_length_a: u64,
    b: &[T],
    stream_length_b: u64,
    capacity: usize,
    rng: &mut impl Rng,
) {
    if stream_length_b < capacity as u64 {
        let replayed = (stream_length_b as usize).min(b.len());
        for (i, item) in b.iter().take(replayed).enumerate() {
            uniformly_sample_stream(a, stream_length_a + i as u64 + 1, item.clone(), capacity, rng);
        }
        return;
    }
    if stream_length_a < capacity as u64 {
        let replayed = (stream_length_a as usize).min(a.len());
        let mut merged = b.to_vec();
        for (i, item) in a.iter().take(replayed).enumerate() {
            uniformly_sample_stream(
                &mut merged,
                stream_length_b + i as u64 + 1,
                item.clone(),
                capacity,
                rng,
            );
        }
        *a = merged;
        return;
    }

    // Both reservoirs have dropped data. Draw a source for each output
    // slot, weighted by stream length, then pick that many distinct
    // residents from each side.
    let total = stream_length_a as f64 + stream_length_b as f64;
    let mut from_a = 0_usize;
    for _ in 0..capacity {
        if rng.gen::<f64>() * total < stream_length_a as f64 {
            from_a += 1;
        }
    }
    let mut from_b = capacity - from_a;
    from_a = from_a.min(a.len());
    from_b = from_b.min(b.len());
    let available = capacity.min(a.len() + b.len());
    while from_a + from_b < available {
        if from_a < a.len() {
            from_a += 1;
        } else {
            from_b += 1;
        }
    }

    let mut merged: Vec<T> = rand::seq::index::sample(rng, a.len(), from_a)
        .iter()
        .map(|index| a[index].clone())
        .collect();
    merged.extend(
        rand::seq::index::sample(rng, b.len(), from_b)
            .iter()
            .map(|index| b[index].clone()),
    );
    *a = merged;
}

/// Down-sample `reservoir` in place until it holds at most `capacity`
/// elements, removing uniformly random residents.
pub fn uniformly_sample_array<T>(reservoir: &mut Vec<T>, capacity: usize, rng: &mut impl Rng) {
    while reservoir.len() > capacity {
        let slot = rng.gen_range(0..reservoir.len());
        reservoir.remove(slot);
    }
}
