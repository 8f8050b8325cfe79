fn main() -> anyhow::Result<()> {
    webdrift::run()
}
