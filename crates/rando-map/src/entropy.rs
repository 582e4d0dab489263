//! # Entropy
//!
//! Node priorities (and the addresses picked by the loader's collaborators)
//! have to come from a cryptographically strong source: predictable
//! priorities would make the tree shape, and predictable addresses the code
//! layout, guessable.

use std::io;



/// A source of random bytes.
pub trait Entropy {
    /// Fill `buf` entirely with random bytes.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn next_u32(&mut self) -> io::Result<u32> {
        let mut bytes = [0; 4];
        self.fill(&mut bytes)?;
        Ok(u32::from_ne_bytes(bytes))
    }

    fn next_usize(&mut self) -> io::Result<usize> {
        let mut bytes = [0; size_of::<usize>()];
        self.fill(&mut bytes)?;
        Ok(usize::from_ne_bytes(bytes))
    }

    /// A uniformly distributed value in `0..bound`.
    ///
    /// Values below `2^32 % bound` are rejected so the final modulo does not
    /// favor small results.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    fn uniform_u32(&mut self, bound: u32) -> io::Result<u32> {
        assert!(bound != 0, "uniform bound must be non-zero");
        let min = bound.wrapping_neg() % bound;
        loop {
            let value = self.next_u32()?;
            if value >= min {
                return Ok(value % bound);
            }
        }
    }

    /// A uniformly distributed value in `0..bound`. See [`Self::uniform_u32`].
    fn uniform_usize(&mut self, bound: usize) -> io::Result<usize> {
        assert!(bound != 0, "uniform bound must be non-zero");
        let min = bound.wrapping_neg() % bound;
        loop {
            let value = self.next_usize()?;
            if value >= min {
                return Ok(value % bound);
            }
        }
    }
}

impl<E: Entropy + ?Sized> Entropy for &mut E {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).fill(buf)
    }
}



/// The kernel's CSPRNG, read with `getrandom(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl Entropy for OsEntropy {
    fn fill(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let res = unsafe { libc::getrandom(buf.as_mut_ptr().cast(), buf.len(), 0) };
            if res < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            buf = &mut buf[res as usize..];
        }

        Ok(())
    }
}




#[cfg(test)]
mod tests {
    use super::{testing::Scripted, *};

    #[test]
    fn os_entropy_fills_large_buffers() {
        let mut buf = [0u8; 4096];
        OsEntropy.fill(&mut buf).unwrap();
        // 4096 zero bytes from a working CSPRNG is not going to happen.
        assert!(buf.iter().any(|b| *b != 0));
    }

    #[test]
    fn uniform_stays_in_bounds() {
        let mut rng = OsEntropy;
        for bound in [1, 2, 3, 7, 1000, u32::MAX] {
            for _ in 0..64 {
                assert!(rng.uniform_u32(bound).unwrap() < bound);
            }
        }
        assert!(rng.uniform_usize(0x4000).unwrap() < 0x4000);
    }

    #[test]
    fn uniform_rejects_the_biased_prefix() {
        // 2^32 % 3 == 1, so a raw 0 must be skipped.
        let mut rng = Scripted::new([0, 5]);
        assert_eq!(rng.uniform_u32(3).unwrap(), 2);
    }
}
