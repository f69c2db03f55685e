//! RC4 stream cipher used by the V1/V2 crypt methods.

/// RC4 keystream state.
pub struct Arcfour {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Arcfour {
    /// Schedule a new keystream.
    ///
    /// Keys longer than 256 bytes only contribute their first 256 bytes.
    /// An empty key leaves the identity permutation in place.
    pub fn new(key: &[u8]) -> Self {
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);

        if !key.is_empty() {
            let mut j: u8 = 0;
            for i in 0..256 {
                j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
                state.swap(i, j as usize);
            }
        }

        Self { state, i: 0, j: 0 }
    }

    /// Encrypt or decrypt `data` (RC4 is symmetric).
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|byte| byte ^ self.next_byte()).collect()
    }

    /// One-shot helper: fresh keystream over `data`.
    pub fn apply(key: &[u8], data: &[u8]) -> Vec<u8> {
        Self::new(key).process(data)
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);

        let idx = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[idx as usize]
    }
}
