pub mod bus;
pub mod camera;
pub mod clock;

// Mock実装（テストとホスト上でのシミュレーションで使用）
pub mod mock;
