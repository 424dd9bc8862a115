use crate::shared::region::Region;

use super::math;

/// Collapses the raw hits of a sliding-window detector into faces.
///
/// Hits that are within `eps` of each other (relative to their size) are
/// clustered, each cluster is averaged into a single rectangle, and only
/// clusters with more than `min_neighbors` members survive. A surviving
/// cluster that sits inside a stronger one is dropped as well.
#[derive(Clone, Copy, Debug)]
pub struct RegionGrouper {
    min_neighbors: usize,
    eps: f64,
}

impl RegionGrouper {
    pub fn new(min_neighbors: usize, eps: f64) -> Self {
        Self { min_neighbors, eps }
    }

    pub fn group(&self, raw: &[Region]) -> Vec<Region> {
        if self.min_neighbors == 0 || raw.is_empty() {
            return raw.to_vec();
        }

        let (labels, n_classes) = math::partition(raw.len(), |a, b| self.similar(&raw[a], &raw[b]));

        let mut sums = vec![[0i64; 4]; n_classes];
        let mut counts = vec![0usize; n_classes];
        for (r, &label) in raw.iter().zip(&labels) {
            let s = &mut sums[label];
            s[0] += i64::from(r.x);
            s[1] += i64::from(r.y);
            s[2] += i64::from(r.width);
            s[3] += i64::from(r.height);
            counts[label] += 1;
        }

        let averaged: Vec<Region> = sums
            .iter()
            .zip(&counts)
            .map(|(s, &n)| {
                let avg = |v: i64| (v as f64 / n as f64).round() as i32;
                Region::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
            })
            .collect();

        let mut faces = Vec::new();
        for (i, r1) in averaged.iter().enumerate() {
            let n1 = counts[i];
            if n1 <= self.min_neighbors {
                continue;
            }
            let nested = averaged.iter().enumerate().any(|(j, r2)| {
                let n2 = counts[j];
                j != i
                    && n2 > self.min_neighbors
                    && self.inside(r1, r2)
                    && (n2 > n1.max(3) || n1 < 3)
            });
            if !nested {
                faces.push(*r1);
            }
        }
        faces
    }

    fn similar(&self, a: &Region, b: &Region) -> bool {
        let delta =
            self.eps * f64::from(a.width.min(b.width) + a.height.min(b.height)) * 0.5;
        f64::from((a.x - b.x).abs()) <= delta
            && f64::from((a.y - b.y).abs()) <= delta
            && f64::from((a.right() - b.right()).abs()) <= delta
            && f64::from((a.bottom() - b.bottom()).abs()) <= delta
    }

    /// True when `inner` fits inside `outer` grown by `eps` of its size.
    fn inside(&self, inner: &Region, outer: &Region) -> bool {
        let dx = (f64::from(outer.width) * self.eps).round() as i32;
        let dy = (f64::from(outer.height) * self.eps).round() as i32;
        inner.x >= outer.x - dx
            && inner.y >= outer.y - dy
            && inner.right() <= outer.right() + dx
            && inner.bottom() <= outer.bottom() + dy
    }
}
