fn main() {
    // Only run on Windows builds
    #[cfg(windows)]
    {
        let mut res = winres::WindowsResource::new();

        // Set application metadata
        res.set("ProductName", "Mapsearch");
        res.set("FileDescription", "Mapsearch - Address Search on a Map");
        res.set("LegalCopyright", "Copyright (c) 2026 Mapsearch Contributors");

        // Compile the resource file
        res.compile().expect("Failed to compile Windows resources");
    }
}
