fn main() {
    // cfg.toml の変更時に設定定数を再生成する
    println!("cargo:rerun-if-changed=cfg.toml");
}
