pub const HTML_CONTENT: &str = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Audio Retagger</title>
    <script src="https://cdn.tailwindcss.com"></script>
    <script src="https://unpkg.com/vue@3/dist/vue.global.js"></script>
</head>
<body class="bg-gray-100 text-gray-800">
    <div id="app" class="min-h-screen p-8">
        <header class="mb-8 flex justify-between items-center bg-white p-4 rounded-lg shadow">
            <div>
                <h1 class="text-3xl font-bold text-indigo-600">Audio Retagger</h1>
                <div class="text-sm text-gray-500 mt-1 truncate">
                    {{ status.root }} <span v-if="status.dry_run" class="ml-2 px-2 rounded bg-yellow-100 text-yellow-800">dry run</span>
                </div>
            </div>
            <div class="flex space-x-2">
                <button v-if="!status.is_paused" @click="post('/api/pause')" :disabled="!status.is_running"
                    class="bg-yellow-500 text-white px-4 py-2 rounded disabled:opacity-50">Pause</button>
                <button v-else @click="post('/api/resume')"
                    class="bg-green-600 text-white px-4 py-2 rounded">Resume</button>
                <button @click="post('/api/stop')" :disabled="!status.is_running || status.stop_requested"
                    class="bg-red-600 text-white px-4 py-2 rounded disabled:opacity-50">Stop</button>
            </div>
        </header>

        <div class="bg-white p-6 rounded-lg shadow mb-8 border-l-4 border-indigo-500">
            <h2 class="text-lg font-bold mb-4 flex justify-between">
                <span>{{ stateLabel }}</span>
                <span class="text-sm font-normal text-gray-500">Elapsed: {{ formatTime(status.elapsed_secs) }}</span>
            </h2>
            <div class="flex justify-between text-sm mb-1">
                <span>Processed: {{ status.files_done }} / {{ status.files_total || '?' }}</span>
                <span>CPU {{ status.resources.cpu_usage.toFixed(1) }}% &middot; MEM {{ formatBytes(status.resources.memory_usage) }}</span>
            </div>
            <div class="w-full bg-gray-200 rounded-full h-2.5">
                <div class="bg-indigo-600 h-2.5 rounded-full transition-all duration-500" :style="{ width: percentComplete + '%' }"></div>
            </div>
            <div v-if="status.last_error" class="text-xs text-red-600 mt-2 truncate">Last error: {{ status.last_error }}</div>
        </div>

        <div class="grid grid-cols-2 md:grid-cols-6 gap-4 mb-8">
            <div v-for="name in outcomes" :key="name" class="bg-white p-4 rounded-lg shadow">
                <h3 class="text-gray-500 text-xs uppercase">{{ name }}</h3>
                <p class="text-3xl font-bold mt-1">{{ status.counts[name] }}</p>
            </div>
        </div>

        <div class="bg-white rounded-lg shadow overflow-hidden">
            <table class="min-w-full leading-normal">
                <thead>
                    <tr>
                        <th class="px-5 py-3 border-b-2 bg-gray-50 text-left text-xs font-semibold text-gray-600 uppercase">Worker</th>
                        <th class="px-5 py-3 border-b-2 bg-gray-50 text-left text-xs font-semibold text-gray-600 uppercase">Handled</th>
                        <th class="px-5 py-3 border-b-2 bg-gray-50 text-left text-xs font-semibold text-gray-600 uppercase">Current file</th>
                    </tr>
                </thead>
                <tbody>
                    <tr v-for="w in status.workers" :key="w.worker">
                        <td class="px-5 py-3 border-b text-sm">#{{ w.worker }}</td>
                        <td class="px-5 py-3 border-b text-sm">{{ w.handled }}</td>
                        <td class="px-5 py-3 border-b text-sm text-gray-500 truncate">{{ w.current_file || 'idle' }}</td>
                    </tr>
                </tbody>
            </table>
        </div>
    </div>

    <script>
        const { createApp, ref, computed, onMounted } = Vue;

        createApp({
            setup() {
                const outcomes = ['recovered', 'renamed', 'simulated', 'skipped', 'failed', 'corrupted'];
                const status = ref({
                    is_running: false, is_paused: false, stop_requested: false, dry_run: false,
                    root: '', files_total: 0, files_done: 0, elapsed_secs: 0, last_error: null,
                    counts: Object.fromEntries(outcomes.map(o => [o, 0])),
                    workers: [], resources: { cpu_usage: 0, memory_usage: 0 }
                });

                const post = async (url) => {
                    try { await fetch(url, { method: 'POST' }); } catch (e) { console.error(e); }
                };

                const percentComplete = computed(() => {
                    if (!status.value.files_total) return 0;
                    return Math.min(100, (status.value.files_done / status.value.files_total) * 100);
                });

                const stateLabel = computed(() => {
                    const s = status.value;
                    if (s.stop_requested && s.is_running) return 'Stopping...';
                    if (s.is_paused && s.is_running) return 'Paused';
                    return s.is_running ? 'Running' : 'Finished';
                });

                const formatBytes = (bytes) => {
                    if (!bytes) return '0 B';
                    const k = 1024, sizes = ['B', 'KB', 'MB', 'GB'];
                    const i = Math.floor(Math.log(bytes) / Math.log(k));
                    return parseFloat((bytes / Math.pow(k, i)).toFixed(1)) + ' ' + sizes[i];
                };

                const formatTime = (secs) => {
                    if (!secs) return '0:00';
                    const m = Math.floor(secs / 60), s = Math.floor(secs % 60);
                    return `${m}:${s.toString().padStart(2, '0')}`;
                };

                onMounted(() => {
                    const source = new EventSource('/api/events');
                    source.onmessage = (ev) => { status.value = JSON.parse(ev.data); };
                });

                return { outcomes, status, post, percentComplete, stateLabel, formatBytes, formatTime };
            }
        }).mount('#app');
    </script>
</body>
</html>
"#;
