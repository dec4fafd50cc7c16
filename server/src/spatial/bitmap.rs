use std::collections::BTreeSet;

/// A 1-based `(x, y)` tile coordinate.
pub type Coord = (u16, u16);

/// Fixed-size boolean grid with one bit per tile.
///
/// Bit `i` of the backing array covers tile `x = i % width + 1`,
/// `y = i / width + 1`. Every operation on a coordinate outside
/// `[1, width] × [1, height]` is a no-op (`get` answers `false`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileBitmap {
    width: u16,
    height: u16,
    bits: Box<[u8]>,
}

impl TileBitmap {
    /// Create an all-clear bitmap of `ceil(width * height / 8)` bytes.
    pub fn new(width: u16, height: u16) -> Self {
        let tiles = width as usize * height as usize;
        Self {
            width,
            height,
            bits: vec![0u8; tiles.div_ceil(8)].into_boxed_slice(),
        }
    }

    /// Build a bitmap with exactly the in-range coordinates of `coords` set.
    pub fn from_set<I>(width: u16, height: u16, coords: I) -> Self
    where
        I: IntoIterator<Item = Coord>,
    {
        let mut bitmap = Self::new(width, height);
        for (x, y) in coords {
            bitmap.set(x, y);
        }
        bitmap
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    #[inline]
    fn index(&self, x: u16, y: u16) -> Option<usize> {
        if x == 0 || y == 0 || x > self.width || y > self.height {
            return None;
        }
        Some((y as usize - 1) * self.width as usize + (x as usize - 1))
    }

    #[inline]
    pub fn set(&mut self, x: u16, y: u16) {
        if let Some(i) = self.index(x, y) {
            self.bits[i >> 3] |= 1 << (i & 7);
        }
    }

    #[inline]
    pub fn clear(&mut self, x: u16, y: u16) {
        if let Some(i) = self.index(x, y) {
            self.bits[i >> 3] &= !(1 << (i & 7));
        }
    }

    #[inline]
    pub fn get(&self, x: u16, y: u16) -> bool {
        match self.index(x, y) {
            Some(i) => self.bits[i >> 3] & (1 << (i & 7)) != 0,
            None => false,
        }
    }

    /// Number of set tiles, counted a byte at a time.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    /// Length of the backing byte array.
    pub fn memory_bytes(&self) -> usize {
        self.bits.len()
    }

    /// Lazily walk the set tiles in row-major order (`y` outer, `x` inner).
    ///
    /// Each call starts a fresh pass.
    pub fn iter(&self) -> Tiles<'_> {
        Tiles {
            bitmap: self,
            next: 0,
        }
    }

    /// Collect the set tiles; the inverse of [`TileBitmap::from_set`].
    pub fn to_set(&self) -> BTreeSet<Coord> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a TileBitmap {
    type Item = Coord;
    type IntoIter = Tiles<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator returned by [`TileBitmap::iter`].
#[derive(Debug, Clone)]
pub struct Tiles<'a> {
    bitmap: &'a TileBitmap,
    next: usize,
}

impl Iterator for Tiles<'_> {
    type Item = Coord;

    fn next(&mut self) -> Option<Coord> {
        let width = self.bitmap.width as usize;
        let total = width * self.bitmap.height as usize;
        while self.next < total {
            let i = self.next;
            let byte = self.bitmap.bits[i >> 3];
            // Whole empty bytes are skipped in one step.
            if i & 7 == 0 && byte == 0 {
                self.next += 8;
                continue;
            }
            self.next += 1;
            if byte & (1 << (i & 7)) != 0 {
                return Some(((i % width) as u16 + 1, (i / width) as u16 + 1));
            }
        }
        None
    }
}
