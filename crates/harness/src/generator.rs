//! Line generator — the workload that runs inside the test image.

use std::io::Write;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorArgs {
    pub iterations: u64,
    pub prefix: String,
    pub delay: Duration,
}

impl Default for GeneratorArgs {
    fn default() -> Self {
        Self {
            iterations: 1000,
            prefix: "pre".to_string(),
            delay: Duration::ZERO,
        }
    }
}

/// Write `prefix_0 .. prefix_{iterations-1}`, one per line, flushing each
/// line before the next. Sleeps `delay` between lines (not after the last).
pub fn generate<W: Write>(args: &GeneratorArgs, mut out: W) -> std::io::Result<u64> {
    for i in 0..args.iterations {
        if i > 0 && !args.delay.is_zero() {
            std::thread::sleep(args.delay);
        }
        writeln!(out, "{}_{}", args.prefix, i)?;
        out.flush()?;
    }
    Ok(args.iterations)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts flushes so we can tell each line was pushed out on its own.
    struct FlushCounter {
        buf: Vec<u8>,
        flushes: usize,
    }

    impl Write for FlushCounter {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_generate_lines() {
        let args = GeneratorArgs {
            iterations: 3,
            prefix: "test".to_string(),
            delay: Duration::ZERO,
        };
        let mut out = Vec::new();
        assert_eq!(generate(&args, &mut out).unwrap(), 3);
        assert_eq!(String::from_utf8(out).unwrap(), "test_0\ntest_1\ntest_2\n");
    }

    #[test]
    fn test_generate_zero_iterations() {
        let args = GeneratorArgs {
            iterations: 0,
            ..GeneratorArgs::default()
        };
        let mut out = Vec::new();
        generate(&args, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_flushes_every_line() {
        let args = GeneratorArgs {
            iterations: 5,
            ..GeneratorArgs::default()
        };
        let mut out = FlushCounter { buf: Vec::new(), flushes: 0 };
        generate(&args, &mut out).unwrap();
        assert_eq!(out.flushes, 5);
        assert!(String::from_utf8(out.buf).unwrap().starts_with("pre_0\n"));
    }

    #[test]
    fn test_delay_between_lines_only() {
        let args = GeneratorArgs {
            iterations: 3,
            prefix: "d".to_string(),
            delay: Duration::from_millis(20),
        };
        let started = std::time::Instant::now();
        generate(&args, Vec::new()).unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(40));
        assert!(elapsed < Duration::from_millis(1000));
    }
}
