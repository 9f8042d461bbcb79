//! タイムアウト付きポーリング
//!
//! 無限ループの代わりに (間隔, 上限) を受け取り、`Done` か `TimedOut` を返します。
//! 待機は固定のスリープ境界でのみ行います。

use crate::hardware::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Done(T),
    TimedOut { elapsed_ms: u64 },
}

/// `probe` が `Some` を返すまで `interval_ms` ごとに呼び出す。`bound_ms` を超えたら打ち切る
///
/// `ctx` はクロックとして使われ、`probe` にもそのまま渡されます。
pub fn poll_with_timeout<Ctx, T, E, F>(
    ctx: &mut Ctx,
    interval_ms: u32,
    bound_ms: u64,
    mut probe: F,
) -> Result<PollOutcome<T>, E>
where
    Ctx: Clock,
    F: FnMut(&mut Ctx) -> Result<Option<T>, E>,
{
    let interval_ms = interval_ms.max(1);
    let started = ctx.now_ms();
    loop {
        if let Some(value) = probe(ctx)? {
            return Ok(PollOutcome::Done(value));
        }
        let elapsed_ms = ctx.now_ms().saturating_sub(started);
        if elapsed_ms >= bound_ms {
            return Ok(PollOutcome::TimedOut { elapsed_ms });
        }
        ctx.delay_ms(interval_ms);
    }
}
