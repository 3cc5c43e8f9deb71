fn main() -> eframe::Result<()> {
    playground_desktop::run()
}
