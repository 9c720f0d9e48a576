fn main() {
    capdeploy::app::cli::run();
}
